//! Run operations: creation, lookup, info updates, lifecycle

use super::{SqliteStore, ARTIFACTS_FOLDER_NAME};
use crate::entities::{LifecycleStage, Run, RunInfo, RunStatus, RunTag};
use crate::error::Result;
use crate::session::{check_experiment_is_active, check_run_is_active, check_run_is_deleted};
use crate::validation;
use rusqlite::params;
use tracing::debug;
use uuid::Uuid;

impl SqliteStore {
    /// Create a run under an active experiment.
    ///
    /// The run id is a store-generated random token, and the artifact URI is
    /// derived from the experiment's artifact location. Duplicate keys in
    /// `tags` resolve last-write-wins.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`](crate::Error::NotFound) for a missing experiment;
    /// [`Error::InvalidState`](crate::Error::InvalidState) for a deleted one.
    pub fn create_run(
        &self,
        experiment_id: &str,
        user_id: &str,
        start_time: i64,
        tags: Vec<RunTag>,
    ) -> Result<Run> {
        for tag in &tags {
            validation::validate_tag(&tag.key, &tag.value)?;
        }
        self.with_session(|session| {
            let experiment =
                session.get_experiment(experiment_id, crate::entities::ViewType::All)?;
            check_experiment_is_active(&experiment)?;

            let run_id = Uuid::new_v4().simple().to_string();
            let artifact_uri = format!(
                "{}/{run_id}/{ARTIFACTS_FOLDER_NAME}",
                experiment.artifact_location
            );

            session.conn().execute(
                "INSERT INTO runs (run_uuid, experiment_id, user_id, status, start_time,
                                   end_time, artifact_uri, lifecycle_stage)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)",
                params![
                    run_id,
                    crate::session::parse_experiment_id(&experiment.experiment_id)?,
                    user_id,
                    RunStatus::Running.as_str(),
                    start_time,
                    artifact_uri,
                    LifecycleStage::Active.as_str(),
                ],
            )?;

            for tag in &tags {
                session.conn().execute(
                    "INSERT INTO tags (run_uuid, key, value) VALUES (?1, ?2, ?3)
                     ON CONFLICT(run_uuid, key) DO UPDATE SET value = excluded.value",
                    params![run_id, tag.key, tag.value],
                )?;
            }

            debug!(%run_id, experiment_id, "created run");
            session.get_run_eager(&run_id)
        })
    }

    /// Fetch a run with its latest metrics, params, and tags eagerly loaded.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`](crate::Error::NotFound) when no such run exists.
    pub fn get_run(&self, run_id: &str) -> Result<Run> {
        self.with_session(|session| session.get_run_eager(run_id))
    }

    /// Update an active run's status and end time.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`](crate::Error::InvalidState) for a deleted run.
    pub fn update_run_info(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: Option<i64>,
    ) -> Result<RunInfo> {
        self.with_session(|session| {
            let run = session.get_run(run_id)?;
            check_run_is_active(&run)?;
            session.conn().execute(
                "UPDATE runs SET status = ?1, end_time = ?2 WHERE run_uuid = ?3",
                params![status.as_str(), end_time, run_id],
            )?;
            session.get_run(run_id)
        })
    }

    /// Soft-delete an active run.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`](crate::Error::InvalidState) when the run is
    /// already deleted.
    pub fn delete_run(&self, run_id: &str) -> Result<()> {
        self.with_session(|session| {
            let run = session.get_run(run_id)?;
            check_run_is_active(&run)?;
            session.conn().execute(
                "UPDATE runs SET lifecycle_stage = ?1 WHERE run_uuid = ?2",
                params![LifecycleStage::Deleted.as_str(), run_id],
            )?;
            Ok(())
        })
    }

    /// Restore a soft-deleted run to the active stage.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`](crate::Error::InvalidState) when the run is
    /// not deleted.
    pub fn restore_run(&self, run_id: &str) -> Result<()> {
        self.with_session(|session| {
            let run = session.get_run(run_id)?;
            check_run_is_deleted(&run)?;
            session.conn().execute(
                "UPDATE runs SET lifecycle_stage = ?1 WHERE run_uuid = ?2",
                params![LifecycleStage::Active.as_str(), run_id],
            )?;
            Ok(())
        })
    }
}
