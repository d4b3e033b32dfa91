//! Run tag upsert and deletion

use super::SqliteStore;
use crate::entities::RunTag;
use crate::error::{Error, Result};
use crate::session::check_run_is_active;
use crate::validation;
use rusqlite::params;

impl SqliteStore {
    /// Set a tag on an active run (upsert, last write wins).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] for a malformed key or value;
    /// [`Error::InvalidState`] for a deleted run.
    pub fn set_tag(&self, run_id: &str, tag: RunTag) -> Result<()> {
        validation::validate_tag(&tag.key, &tag.value)?;
        self.with_session(|session| {
            let run = session.get_run(run_id)?;
            check_run_is_active(&run)?;
            session.conn().execute(
                "INSERT INTO tags (run_uuid, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(run_uuid, key) DO UPDATE SET value = excluded.value",
                params![run_id, tag.key, tag.value],
            )?;
            Ok(())
        })
    }

    /// Delete a tag from an active run. This is irreversible.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no such tag exists; [`Error::InvalidState`]
    /// when multiple rows match one `(run_id, key)`, which signals bad data
    /// (the uniqueness invariant should make that structurally impossible).
    pub fn delete_tag(&self, run_id: &str, key: &str) -> Result<()> {
        self.with_session(|session| {
            let run = session.get_run(run_id)?;
            check_run_is_active(&run)?;

            let matches: i64 = session.conn().query_row(
                "SELECT COUNT(*) FROM tags WHERE run_uuid = ?1 AND key = ?2",
                params![run_id, key],
                |row| row.get(0),
            )?;
            match matches {
                0 => Err(Error::NotFound(format!(
                    "No tag with name: {key} in run with id {run_id}"
                ))),
                1 => {
                    session.conn().execute(
                        "DELETE FROM tags WHERE run_uuid = ?1 AND key = ?2",
                        params![run_id, key],
                    )?;
                    Ok(())
                }
                _ => Err(Error::InvalidState(
                    "Bad data in database - tags for a specific run must have a single unique \
                     value."
                        .to_string(),
                )),
            }
        })
    }
}
