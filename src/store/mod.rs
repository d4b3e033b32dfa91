//! SQLite-backed transactional metadata store
//!
//! Sovereign, local-first storage using SQLite with WAL mode.
//!
//! # Toyota Way: (Heijunka)
//!
//! SQLite provides consistent, predictable performance without external
//! dependencies; all cross-operation coordination is delegated to its
//! transaction isolation.
//!
//! # Example
//!
//! ```
//! use rastro_db::store::SqliteStore;
//! use rastro_db::entities::Metric;
//!
//! # fn main() -> rastro_db::Result<()> {
//! let store = SqliteStore::open_in_memory()?;
//! let exp_id = store.create_experiment("my-exp", None)?;
//! let run = store.create_run(&exp_id, "ada", 1_700_000_000_000, vec![])?;
//! store.log_metric(&run.info.run_id, Metric::new("loss", 0.5, 1_700_000_000_100, 0))?;
//! # Ok(())
//! # }
//! ```

mod batch;
mod experiments;
mod metrics;
mod params;
mod runs;
mod search;
mod tags;

use crate::entities::LifecycleStage;
use crate::error::{Error, Result};
use crate::schema;
use crate::session::Session;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Reserved id of the permanently present default experiment.
pub const DEFAULT_EXPERIMENT_ID: &str = "0";
/// Name of the default experiment seeded at bootstrap.
pub const DEFAULT_EXPERIMENT_NAME: &str = "Default";
/// Fixed path segment appended to a run's artifact URI.
pub(crate) const ARTIFACTS_FOLDER_NAME: &str = "artifacts";

/// Default artifact root used by [`SqliteStore::open_in_memory`].
const DEFAULT_ARTIFACT_ROOT: &str = "mlruns";

/// Current wall-clock time in milliseconds since the epoch.
///
/// Convenience for callers populating `start_time`/`end_time` and metric
/// timestamps; the store itself never stamps entities implicitly.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// SQLite-backed store for experiment tracking metadata.
///
/// A passive library type: it holds no mutable state beyond the connection
/// and a read-only configuration snapshot, and never caches entity state
/// across sessions. Clone handles share the underlying connection.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    artifact_root: String,
}

impl SqliteStore {
    /// Open or create a store at the given database path.
    ///
    /// Bootstrap runs before any client traffic: tables are created at the
    /// base structural version when entirely absent, forward migrations are
    /// applied, the schema version marker is verified, and the reserved
    /// default experiment is seeded when no experiments exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the database cannot be opened or the
    /// live schema version does not match the expected revision (the message
    /// instructs the operator to migrate).
    pub fn open<P: AsRef<Path>>(path: P, artifact_root: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            Error::Internal(format!("failed to open tracking database: {e}"))
        })?;
        Self::from_connection(conn, artifact_root)
    }

    /// Open an in-memory store (primarily for testing).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] on bootstrap failure.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Internal(format!("failed to open in-memory database: {e}")))?;
        Self::from_connection(conn, DEFAULT_ARTIFACT_ROOT)
    }

    fn from_connection(conn: Connection, artifact_root: &str) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        // WAL mode for file-backed databases (no-op for in-memory)
        let _ = conn.pragma_update(None, "journal_mode", "WAL");

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            artifact_root: artifact_root.trim_end_matches('/').to_string(),
        };
        store.bootstrap()?;
        Ok(store)
    }

    fn bootstrap(&self) -> Result<()> {
        self.with_session(|session| {
            let conn = session.conn();
            if schema::tables_absent(conn)? {
                schema::initialize_tables(conn)?;
                schema::migrate_to_latest(conn)?;
            }
            schema::verify_schema(conn)?;

            if session.count_experiments()? == 0 {
                self.create_default_experiment(session)?;
            }
            Ok(())
        })
    }

    /// Seed the reserved default experiment with an explicit id of zero.
    ///
    /// Zero is not a value the AUTOINCREMENT sequence produces, so the row is
    /// inserted with its id spelled out rather than through the normal
    /// auto-assigned-identity path.
    fn create_default_experiment(&self, session: &Session<'_>) -> Result<()> {
        info!("seeding default experiment (id 0)");
        session.conn().execute(
            "INSERT INTO experiments (experiment_id, name, artifact_location, lifecycle_stage)
             VALUES (0, ?1, ?2, ?3)",
            rusqlite::params![
                DEFAULT_EXPERIMENT_NAME,
                self.experiment_artifact_location(0),
                LifecycleStage::Active.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Execute `f` inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// Commits on `Ok`, rolls back on `Err`. Domain errors propagate
    /// unchanged; storage-layer failures were already wrapped as
    /// [`Error::Internal`] at their `?` sites. The connection guard is
    /// released exactly once when this returns, even if `f` fails early.
    pub(crate) fn with_session<T>(
        &self,
        f: impl FnOnce(&Session<'_>) -> Result<T>,
    ) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Internal("connection mutex poisoned".to_string()))?;
        // BEGIN IMMEDIATE acquires the write lock up front, serializing the
        // compare-and-swap on latest_metrics against concurrent writers.
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let session = Session::new(&conn);
        match f(&session) {
            Ok(value) => {
                if let Err(e) = conn.execute_batch("COMMIT") {
                    // A failed COMMIT can leave the transaction open; roll it
                    // back so the shared connection can begin the next one.
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(e.into());
                }
                Ok(value)
            }
            Err(err) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    }

    /// Artifact location for an experiment id under the configured root.
    pub(crate) fn experiment_artifact_location(&self, experiment_id: i64) -> String {
        format!("{}/{experiment_id}", self.artifact_root)
    }
}
