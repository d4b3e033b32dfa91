//! Experiment operations: creation, lookup, lifecycle, tags

use super::SqliteStore;
use crate::entities::{Experiment, ExperimentTag, LifecycleStage, ViewType};
use crate::error::{is_unique_violation, Error, Result};
use crate::session::{check_experiment_is_active, parse_experiment_id};
use crate::validation;
use rusqlite::params;
use tracing::debug;

impl SqliteStore {
    /// Create an experiment and return its assigned id.
    ///
    /// When no artifact location is supplied, one is computed from the
    /// assigned id. That requires a two-step write inside the transaction:
    /// insert, read back the id, then update the location.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] for a malformed name;
    /// [`Error::AlreadyExists`] when the name is taken (name conflicts are
    /// always surfaced, never reconciled).
    pub fn create_experiment(
        &self,
        name: &str,
        artifact_location: Option<&str>,
    ) -> Result<String> {
        validation::validate_experiment_name(name)?;
        self.with_session(|session| {
            let insert = session.conn().execute(
                "INSERT INTO experiments (name, artifact_location, lifecycle_stage)
                 VALUES (?1, ?2, ?3)",
                params![name, artifact_location, LifecycleStage::Active.as_str()],
            );
            if let Err(e) = insert {
                if is_unique_violation(&e) {
                    return Err(Error::AlreadyExists(format!(
                        "Experiment(name={name}) already exists."
                    )));
                }
                return Err(e.into());
            }

            let experiment_id = session.conn().last_insert_rowid();
            if artifact_location.is_none() {
                session.conn().execute(
                    "UPDATE experiments SET artifact_location = ?1 WHERE experiment_id = ?2",
                    params![self.experiment_artifact_location(experiment_id), experiment_id],
                )?;
            }
            debug!(experiment_id, name, "created experiment");
            Ok(experiment_id.to_string())
        })
    }

    /// Fetch an experiment by id, regardless of lifecycle stage.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no such experiment exists.
    pub fn get_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        self.with_session(|session| session.get_experiment(experiment_id, ViewType::All))
    }

    /// Fetch an experiment by name, returning `None` when absent.
    ///
    /// Absence is an explicit result rather than an error so callers can
    /// implement create-if-missing idempotently.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] when multiple experiments share the name
    /// (a data-integrity bug).
    pub fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        self.with_session(|session| session.get_experiment_by_name(name))
    }

    /// List experiments whose lifecycle stage matches the view.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`] on storage failure.
    pub fn list_experiments(&self, view: ViewType) -> Result<Vec<Experiment>> {
        self.with_session(|session| session.list_experiments(None, None, view))
    }

    /// Soft-delete an active experiment.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the experiment is absent or already deleted.
    pub fn delete_experiment(&self, experiment_id: &str) -> Result<()> {
        self.with_session(|session| {
            let experiment = session.get_experiment(experiment_id, ViewType::ActiveOnly)?;
            session.conn().execute(
                "UPDATE experiments SET lifecycle_stage = ?1 WHERE experiment_id = ?2",
                params![
                    LifecycleStage::Deleted.as_str(),
                    parse_experiment_id(&experiment.experiment_id)?
                ],
            )?;
            debug!(experiment_id, "deleted experiment");
            Ok(())
        })
    }

    /// Restore a soft-deleted experiment to the active stage.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the experiment is absent or not deleted.
    pub fn restore_experiment(&self, experiment_id: &str) -> Result<()> {
        self.with_session(|session| {
            let experiment = session.get_experiment(experiment_id, ViewType::DeletedOnly)?;
            session.conn().execute(
                "UPDATE experiments SET lifecycle_stage = ?1 WHERE experiment_id = ?2",
                params![
                    LifecycleStage::Active.as_str(),
                    parse_experiment_id(&experiment.experiment_id)?
                ],
            )?;
            debug!(experiment_id, "restored experiment");
            Ok(())
        })
    }

    /// Rename an active experiment.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] for a non-active experiment;
    /// [`Error::AlreadyExists`] when the new name is taken.
    pub fn rename_experiment(&self, experiment_id: &str, new_name: &str) -> Result<()> {
        validation::validate_experiment_name(new_name)?;
        self.with_session(|session| {
            let experiment = session.get_experiment(experiment_id, ViewType::All)?;
            if experiment.lifecycle_stage != LifecycleStage::Active {
                return Err(Error::InvalidState(
                    "Cannot rename a non-active experiment.".to_string(),
                ));
            }
            let update = session.conn().execute(
                "UPDATE experiments SET name = ?1 WHERE experiment_id = ?2",
                params![new_name, parse_experiment_id(experiment_id)?],
            );
            if let Err(e) = update {
                if is_unique_violation(&e) {
                    return Err(Error::AlreadyExists(format!(
                        "Experiment(name={new_name}) already exists."
                    )));
                }
                return Err(e.into());
            }
            Ok(())
        })
    }

    /// Set a tag on an active experiment (upsert, last write wins).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] for a non-active experiment;
    /// [`Error::InvalidParameter`] for a malformed key or value.
    pub fn set_experiment_tag(&self, experiment_id: &str, tag: ExperimentTag) -> Result<()> {
        validation::validate_tag(&tag.key, &tag.value)?;
        self.with_session(|session| {
            let experiment = session.get_experiment(experiment_id, ViewType::All)?;
            check_experiment_is_active(&experiment)?;
            session.conn().execute(
                "INSERT INTO experiment_tags (experiment_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(experiment_id, key) DO UPDATE SET value = excluded.value",
                params![parse_experiment_id(experiment_id)?, tag.key, tag.value],
            )?;
            Ok(())
        })
    }
}
