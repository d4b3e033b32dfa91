//! Run - execution instance of an experiment

use super::{LatestMetric, LifecycleStage, Param, RunTag};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is currently executing.
    Running,
    /// Run is scheduled but has not started.
    Scheduled,
    /// Run completed successfully.
    Finished,
    /// Run failed with an error.
    Failed,
    /// Run was killed by user or system.
    Killed,
}

impl RunStatus {
    /// Status name as stored in the `status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Scheduled => "SCHEDULED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
        }
    }

    /// Parse a stored status name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] for an unrecognized status.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "SCHEDULED" => Ok(Self::Scheduled),
            "FINISHED" => Ok(Self::Finished),
            "FAILED" => Ok(Self::Failed),
            "KILLED" => Ok(Self::Killed),
            other => Err(Error::Internal(format!(
                "unrecognized run status '{other}' in database"
            ))),
        }
    }
}

/// Immutable descriptive fields of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunInfo {
    /// Store-generated unique identifier.
    pub run_id: String,
    /// Owning experiment.
    pub experiment_id: String,
    /// User who created the run.
    pub user_id: String,
    /// Current run status.
    pub status: RunStatus,
    /// Start time in milliseconds since the epoch.
    pub start_time: i64,
    /// End time in milliseconds since the epoch, if the run has ended.
    pub end_time: Option<i64>,
    /// URI under which this run's artifacts are stored.
    pub artifact_uri: String,
    /// Current lifecycle stage.
    pub lifecycle_stage: LifecycleStage,
}

/// Logged facts of a run: latest metrics, params, and tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunData {
    /// Most recent metric fact per key (the derived latest view).
    pub metrics: Vec<LatestMetric>,
    /// Logged parameters.
    pub params: Vec<Param>,
    /// Tags set on the run.
    pub tags: Vec<RunTag>,
}

/// A run together with its logged data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    /// Descriptive fields.
    pub info: RunInfo,
    /// Latest metrics, params, and tags.
    pub data: RunData,
}

impl Run {
    /// Latest metric value for a key, if any metric was logged under it.
    #[must_use]
    pub fn latest_metric(&self, key: &str) -> Option<&LatestMetric> {
        self.data.metrics.iter().find(|m| m.key == key)
    }

    /// Param value by key.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.data
            .params
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Tag value by key.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.data
            .tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}
