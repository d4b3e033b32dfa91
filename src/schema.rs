//! Schema definition, version marker, and forward migrations
//!
//! The store refuses to serve traffic unless the live schema's version marker
//! equals the expected head revision. A completely empty database is created
//! at the base structural version and then migrated forward, so fresh and
//! long-lived databases take the same migration path.

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

/// Oldest known structural version. An entirely empty database is created at
/// this version before forward migrations run.
pub const BASE_SCHEMA_VERSION: &str = "1.0.0";

/// A forward schema migration.
struct Migration {
    version: &'static str,
    sql: &'static str,
}

/// Forward migrations, ordered oldest to newest.
const MIGRATIONS: &[Migration] = &[Migration {
    version: "1.1.0",
    sql: "CREATE INDEX IF NOT EXISTS idx_runs_experiment ON runs(experiment_id);
          CREATE INDEX IF NOT EXISTS idx_metrics_run_key ON metrics(run_uuid, key);
          CREATE INDEX IF NOT EXISTS idx_latest_metrics_run ON latest_metrics(run_uuid);",
}];

/// The schema version this build of the store expects.
#[must_use]
pub fn expected_schema_version() -> &'static str {
    MIGRATIONS.last().map_or(BASE_SCHEMA_VERSION, |m| m.version)
}

/// Read the live schema's version marker, if any.
///
/// # Errors
///
/// Returns [`Error::Internal`] on storage failure.
pub fn current_schema_version(conn: &Connection) -> Result<Option<String>> {
    let version: Option<String> = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY rowid DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version)
}

/// Whether the core tables are entirely absent (fresh database).
pub(crate) fn tables_absent(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
         ('experiments', 'runs', 'metrics', 'latest_metrics', 'params', 'tags', 'experiment_tags')",
        [],
        |row| row.get(0),
    )?;
    Ok(count == 0)
}

/// Create the core tables at the base structural version.
pub(crate) fn initialize_tables(conn: &Connection) -> Result<()> {
    info!("creating initial experiment tracking tables");
    conn.execute_batch(BASE_SCHEMA_SQL)?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [BASE_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// Apply every forward migration newer than the live version and advance the
/// version marker.
///
/// # Errors
///
/// Returns [`Error::Internal`] if the live version marker is missing or a
/// migration statement fails.
pub fn migrate_to_latest(conn: &Connection) -> Result<()> {
    let current = current_schema_version(conn)?.ok_or_else(|| {
        Error::Internal("database has tracking tables but no schema version marker".to_string())
    })?;

    // Versions are compared positionally against the ordered migration list;
    // an unknown marker means the database is newer than this build.
    let mut applying = current == BASE_SCHEMA_VERSION;
    if !applying && !MIGRATIONS.iter().any(|m| m.version == current) {
        return Err(Error::Internal(format!(
            "unknown schema version '{current}' (expected at most '{}')",
            expected_schema_version()
        )));
    }

    for migration in MIGRATIONS {
        if applying {
            info!(version = migration.version, "applying schema migration");
            conn.execute_batch(migration.sql)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [migration.version],
            )?;
        } else if migration.version == current {
            applying = true;
        }
    }
    Ok(())
}

/// Verify the live schema version equals the expected head revision.
///
/// # Errors
///
/// Returns a fatal [`Error::Internal`] instructing the operator to migrate
/// when the versions differ.
pub fn verify_schema(conn: &Connection) -> Result<()> {
    let expected = expected_schema_version();
    let current = current_schema_version(conn)?;
    match current {
        Some(ref v) if v == expected => Ok(()),
        other => Err(Error::Internal(format!(
            "Detected out-of-date database schema (found version {}, but expected {expected}). \
             Take a backup of your database, then run a schema migration to the latest version \
             before restarting the store.",
            other.as_deref().unwrap_or("none")
        ))),
    }
}

const BASE_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS experiments (
    experiment_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    artifact_location TEXT,
    lifecycle_stage TEXT NOT NULL DEFAULT 'active'
);

CREATE TABLE IF NOT EXISTS runs (
    run_uuid TEXT PRIMARY KEY,
    experiment_id INTEGER NOT NULL,
    user_id TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    artifact_uri TEXT NOT NULL,
    lifecycle_stage TEXT NOT NULL DEFAULT 'active',
    FOREIGN KEY (experiment_id) REFERENCES experiments(experiment_id)
);

CREATE TABLE IF NOT EXISTS metrics (
    run_uuid TEXT NOT NULL,
    key TEXT NOT NULL,
    value REAL NOT NULL,
    timestamp INTEGER NOT NULL,
    step INTEGER NOT NULL,
    is_nan INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (run_uuid, key, value, timestamp, step, is_nan),
    FOREIGN KEY (run_uuid) REFERENCES runs(run_uuid)
);

CREATE TABLE IF NOT EXISTS latest_metrics (
    run_uuid TEXT NOT NULL,
    key TEXT NOT NULL,
    value REAL NOT NULL,
    timestamp INTEGER NOT NULL,
    step INTEGER NOT NULL,
    is_nan INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (run_uuid, key),
    FOREIGN KEY (run_uuid) REFERENCES runs(run_uuid)
);

CREATE TABLE IF NOT EXISTS params (
    run_uuid TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (run_uuid, key),
    FOREIGN KEY (run_uuid) REFERENCES runs(run_uuid)
);

CREATE TABLE IF NOT EXISTS tags (
    run_uuid TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (run_uuid, key),
    FOREIGN KEY (run_uuid) REFERENCES runs(run_uuid)
);

CREATE TABLE IF NOT EXISTS experiment_tags (
    experiment_id INTEGER NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (experiment_id, key),
    FOREIGN KEY (experiment_id) REFERENCES experiments(experiment_id)
);
";

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        conn
    }

    #[test]
    fn test_fresh_database_reports_tables_absent() {
        let conn = fresh_conn();
        assert!(tables_absent(&conn).unwrap());
        initialize_tables(&conn).unwrap();
        assert!(!tables_absent(&conn).unwrap());
    }

    #[test]
    fn test_initialize_records_base_version() {
        let conn = fresh_conn();
        initialize_tables(&conn).unwrap();
        assert_eq!(
            current_schema_version(&conn).unwrap().as_deref(),
            Some(BASE_SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_migrate_advances_to_expected_head() {
        let conn = fresh_conn();
        initialize_tables(&conn).unwrap();
        migrate_to_latest(&conn).unwrap();
        assert_eq!(
            current_schema_version(&conn).unwrap().as_deref(),
            Some(expected_schema_version())
        );
        verify_schema(&conn).unwrap();
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = fresh_conn();
        initialize_tables(&conn).unwrap();
        migrate_to_latest(&conn).unwrap();
        migrate_to_latest(&conn).unwrap();
        verify_schema(&conn).unwrap();
    }

    #[test]
    fn test_verify_fails_on_stale_version() {
        let conn = fresh_conn();
        initialize_tables(&conn).unwrap();
        // Base version only, no forward migrations applied
        let err = verify_schema(&conn).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("out-of-date"));
        assert!(msg.contains(expected_schema_version()));
        assert!(msg.contains(BASE_SCHEMA_VERSION));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let conn = fresh_conn();
        initialize_tables(&conn).unwrap();
        conn.execute("UPDATE schema_version SET version = '9.9.9'", [])
            .unwrap();
        assert!(migrate_to_latest(&conn).is_err());
    }
}
