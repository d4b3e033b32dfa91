//! Param logging with write-once conflict reconciliation

use super::SqliteStore;
use crate::entities::Param;
use crate::error::{is_unique_violation, Error, Result};
use crate::session::check_run_is_active;
use crate::validation;
use rusqlite::params;

impl SqliteStore {
    /// Log a parameter for an active run.
    ///
    /// Params are write-once. The insert is attempted directly against the
    /// `(run_id, key)` uniqueness constraint; when it is violated, the
    /// existing value is re-read in the same still-usable transaction to
    /// disambiguate: an identical value is an idempotent retry and succeeds,
    /// a different value is a conflict naming the key and both values.
    /// Read-then-write without that constraint backing it would race.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyExists`] when the key holds a different value;
    /// [`Error::InvalidState`] for a deleted run.
    pub fn log_param(&self, run_id: &str, param: Param) -> Result<()> {
        validation::validate_param(&param)?;
        self.with_session(|session| {
            let run = session.get_run(run_id)?;
            check_run_is_active(&run)?;

            let insert = session.conn().execute(
                "INSERT INTO params (run_uuid, key, value) VALUES (?1, ?2, ?3)",
                params![run_id, param.key, param.value],
            );
            match insert {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => {
                    // The failed statement leaves the transaction usable, so
                    // the conflicting row is visible under the same state the
                    // constraint check saw.
                    match session.get_param_value(run_id, &param.key)? {
                        Some(old_value) if old_value == param.value => Ok(()),
                        Some(old_value) => Err(Error::AlreadyExists(format!(
                            "Changing param values is not allowed. Param with key='{}' was \
                             already logged with value='{old_value}' for run ID='{run_id}'. \
                             Attempted logging new value '{}'.",
                            param.key, param.value
                        ))),
                        None => Err(e.into()),
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
    }
}
