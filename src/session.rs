//! Transactional session over the SQLite connection
//!
//! A [`Session`] is the sole unit of atomicity: every public store operation
//! runs inside exactly one session (batch logging deliberately uses several,
//! one per item). Sessions also host the shared entity-lookup helpers and the
//! lifecycle guards, so a state check and the mutation it protects always
//! share one transaction.

use crate::entities::{
    Experiment, ExperimentTag, LatestMetric, LifecycleStage, Param, Run, RunData, RunInfo,
    RunStatus, RunTag, ViewType,
};
use crate::error::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

/// Handle to an open transaction.
///
/// Holds a borrowed connection for the duration of one `BEGIN IMMEDIATE`
/// transaction; it cannot outlive the store operation that opened it.
pub(crate) struct Session<'c> {
    conn: &'c Connection,
}

impl<'c> Session<'c> {
    pub(crate) const fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Raw connection for statement execution within this transaction.
    pub(crate) const fn conn(&self) -> &'c Connection {
        self.conn
    }

    // =========================================================================
    // Entity lookup
    // =========================================================================

    /// Fetch experiments by optional id/name lists, restricted to the stages
    /// admitted by `view`.
    pub(crate) fn list_experiments(
        &self,
        ids: Option<&[i64]>,
        names: Option<&[&str]>,
        view: ViewType,
    ) -> Result<Vec<Experiment>> {
        let stages = view.stages();
        let mut sql = format!(
            "SELECT experiment_id, name, artifact_location, lifecycle_stage
             FROM experiments WHERE lifecycle_stage IN ({})",
            placeholders(stages.len())
        );
        let mut binds: Vec<Value> = stages
            .iter()
            .map(|s| Value::from((*s).to_string()))
            .collect();

        if let Some(ids) = ids {
            sql.push_str(&format!(
                " AND experiment_id IN ({})",
                placeholders(ids.len())
            ));
            binds.extend(ids.iter().map(|id| Value::from(*id)));
        }
        if let Some(names) = names {
            sql.push_str(&format!(" AND name IN ({})", placeholders(names.len())));
            binds.extend(names.iter().map(|n| Value::from((*n).to_string())));
        }
        sql.push_str(" ORDER BY experiment_id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(binds), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut experiments = Vec::new();
        for row in rows {
            let (id, name, artifact_location, stage) = row?;
            experiments.push(Experiment {
                experiment_id: id.to_string(),
                name,
                artifact_location: artifact_location.unwrap_or_default(),
                lifecycle_stage: LifecycleStage::parse(&stage)?,
                tags: self.get_experiment_tags(id)?,
            });
        }
        Ok(experiments)
    }

    /// Fetch exactly one experiment by id within the view.
    ///
    /// Zero rows is [`Error::NotFound`]; more than one is [`Error::InvalidState`]
    /// (structurally impossible under the primary key, checked defensively).
    pub(crate) fn get_experiment(&self, experiment_id: &str, view: ViewType) -> Result<Experiment> {
        let id = parse_experiment_id(experiment_id)?;
        let mut experiments = self.list_experiments(Some(&[id]), None, view)?;
        match experiments.len() {
            0 => Err(Error::NotFound(format!(
                "No Experiment with id={experiment_id} exists"
            ))),
            1 => Ok(experiments.remove(0)),
            n => Err(Error::InvalidState(format!(
                "Expected only 1 experiment with id={experiment_id}. Found {n}."
            ))),
        }
    }

    /// Fetch an experiment by name, tolerating absence.
    ///
    /// Returns `Ok(None)` for zero matches to support create-if-missing
    /// callers; more than one match is an integrity error.
    pub(crate) fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        let mut experiments = self.list_experiments(None, Some(&[name]), ViewType::All)?;
        match experiments.len() {
            0 => Ok(None),
            1 => Ok(Some(experiments.remove(0))),
            n => Err(Error::InvalidState(format!(
                "Expected only 1 experiment with name={name}. Found {n}."
            ))),
        }
    }

    fn get_experiment_tags(&self, experiment_id: i64) -> Result<Vec<ExperimentTag>> {
        let mut stmt = self.conn.prepare(
            "SELECT key, value FROM experiment_tags WHERE experiment_id = ?1 ORDER BY key",
        )?;
        let rows = stmt.query_map([experiment_id], |row| {
            Ok(ExperimentTag {
                key: row.get(0)?,
                value: row.get(1)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Fetch exactly one run's info by id.
    ///
    /// Zero rows is [`Error::NotFound`]; more than one is [`Error::InvalidState`].
    pub(crate) fn get_run(&self, run_id: &str) -> Result<RunInfo> {
        let mut stmt = self.conn.prepare(
            "SELECT run_uuid, experiment_id, user_id, status, start_time, end_time,
                    artifact_uri, lifecycle_stage
             FROM runs WHERE run_uuid = ?1",
        )?;
        let rows = stmt.query_map([run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut infos = Vec::new();
        for row in rows {
            let (run_uuid, experiment_id, user_id, status, start_time, end_time, uri, stage) =
                row?;
            infos.push(RunInfo {
                run_id: run_uuid,
                experiment_id: experiment_id.to_string(),
                user_id,
                status: RunStatus::parse(&status)?,
                start_time,
                end_time,
                artifact_uri: uri,
                lifecycle_stage: LifecycleStage::parse(&stage)?,
            });
        }
        match infos.len() {
            0 => Err(Error::NotFound(format!("Run with id={run_id} not found"))),
            1 => Ok(infos.remove(0)),
            n => Err(Error::InvalidState(format!(
                "Expected only 1 run with id={run_id}. Found {n}."
            ))),
        }
    }

    /// Eagerly load a run's latest metrics, params, and tags.
    pub(crate) fn load_run_data(&self, run_id: &str) -> Result<RunData> {
        let mut stmt = self.conn.prepare(
            "SELECT key, value, timestamp, step, is_nan
             FROM latest_metrics WHERE run_uuid = ?1 ORDER BY key",
        )?;
        let metrics = stmt
            .query_map([run_id], |row| {
                Ok(LatestMetric {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    timestamp: row.get(2)?,
                    step: row.get(3)?,
                    is_nan: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM params WHERE run_uuid = ?1 ORDER BY key")?;
        let params = stmt
            .query_map([run_id], |row| {
                Ok(Param {
                    key: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM tags WHERE run_uuid = ?1 ORDER BY key")?;
        let tags = stmt
            .query_map([run_id], |row| {
                Ok(RunTag {
                    key: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(RunData {
            metrics,
            params,
            tags,
        })
    }

    /// Fetch a run with its data eagerly materialized.
    pub(crate) fn get_run_eager(&self, run_id: &str) -> Result<Run> {
        let info = self.get_run(run_id)?;
        let data = self.load_run_data(run_id)?;
        Ok(Run { info, data })
    }

    /// Fetch all runs in the given experiments whose stage the view admits,
    /// with data eagerly materialized.
    pub(crate) fn list_runs(&self, experiment_ids: &[i64], view: ViewType) -> Result<Vec<Run>> {
        let stages = view.stages();
        let sql = format!(
            "SELECT run_uuid FROM runs
             WHERE experiment_id IN ({}) AND lifecycle_stage IN ({})
             ORDER BY start_time DESC, run_uuid",
            placeholders(experiment_ids.len()),
            placeholders(stages.len())
        );
        let mut binds: Vec<Value> = experiment_ids.iter().map(|id| Value::from(*id)).collect();
        binds.extend(stages.iter().map(|s| Value::from((*s).to_string())));

        let mut stmt = self.conn.prepare(&sql)?;
        let run_ids = stmt
            .query_map(params_from_iter(binds), |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        run_ids
            .iter()
            .map(|run_id| self.get_run_eager(run_id))
            .collect()
    }

    /// Count experiments across all lifecycle stages.
    pub(crate) fn count_experiments(&self) -> Result<i64> {
        let count =
            self.conn
                .query_row("SELECT COUNT(*) FROM experiments", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Look up the single param value for `(run_id, key)`, if present.
    pub(crate) fn get_param_value(&self, run_id: &str, key: &str) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        let value = self
            .conn
            .query_row(
                "SELECT value FROM params WHERE run_uuid = ?1 AND key = ?2",
                params![run_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

// =============================================================================
// Lifecycle guards
// =============================================================================

/// Require an active run before mutation.
pub(crate) fn check_run_is_active(run: &RunInfo) -> Result<()> {
    if run.lifecycle_stage != LifecycleStage::Active {
        return Err(Error::InvalidState(format!(
            "The run {} must be in the 'active' state. Current state is {}.",
            run.run_id,
            run.lifecycle_stage.as_str()
        )));
    }
    Ok(())
}

/// Require a deleted run before restore.
pub(crate) fn check_run_is_deleted(run: &RunInfo) -> Result<()> {
    if run.lifecycle_stage != LifecycleStage::Deleted {
        return Err(Error::InvalidState(format!(
            "The run {} must be in the 'deleted' state. Current state is {}.",
            run.run_id,
            run.lifecycle_stage.as_str()
        )));
    }
    Ok(())
}

/// Require an active experiment before mutation.
pub(crate) fn check_experiment_is_active(experiment: &Experiment) -> Result<()> {
    if experiment.lifecycle_stage != LifecycleStage::Active {
        return Err(Error::InvalidState(format!(
            "The experiment {} must be in the 'active' state. Current state is {}.",
            experiment.experiment_id,
            experiment.lifecycle_stage.as_str()
        )));
    }
    Ok(())
}

/// Parse a caller-supplied experiment id into its column representation.
pub(crate) fn parse_experiment_id(experiment_id: &str) -> Result<i64> {
    experiment_id.parse::<i64>().map_err(|_| {
        Error::InvalidParameter(format!("Invalid experiment id: '{experiment_id}'"))
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
