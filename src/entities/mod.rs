//! Entity model for experiment tracking
//!
//! Typed records for experiments, runs, and their logged facts, with string
//! codecs for the columns that persist them.
//!
//! ## Schema Overview
//!
//! ```text
//! Experiment (1) ──< Run (N)
//!                      │
//!                      ├──< Metric (N) [append-only time series]
//!                      ├──< LatestMetric (≤1 per key) [derived]
//!                      ├──< Param (N) [write-once]
//!                      └──< RunTag (N) [upsert]
//! ```
//!
//! These are plain domain value objects: no database handle leaks past the
//! session boundary, and the store never shares mutable entity state.

mod experiment;
pub(crate) mod metric;
mod param;
mod run;
mod tag;

pub use experiment::Experiment;
pub use metric::{LatestMetric, Metric};
pub use param::Param;
pub use run::{Run, RunData, RunInfo, RunStatus};
pub use tag::{ExperimentTag, RunTag};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Lifecycle stage controlling whether an entity accepts further mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleStage {
    /// Entity accepts mutation (metrics/params/tags, info updates, delete).
    Active,
    /// Entity is soft-deleted; only restore is permitted.
    Deleted,
}

impl LifecycleStage {
    /// Stage name as stored in the `lifecycle_stage` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }

    /// Parse a stored stage name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] for an unrecognized stage, which signals
    /// bad data in the database rather than caller error.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "deleted" => Ok(Self::Deleted),
            other => Err(Error::Internal(format!(
                "unrecognized lifecycle stage '{other}' in database"
            ))),
        }
    }
}

/// View filter over lifecycle stages for list/search operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewType {
    /// Only `active` entities.
    ActiveOnly,
    /// Only `deleted` entities.
    DeletedOnly,
    /// Both stages.
    All,
}

impl ViewType {
    /// Whether the view admits the given stage.
    #[must_use]
    pub const fn matches(self, stage: LifecycleStage) -> bool {
        matches!(
            (self, stage),
            (Self::All, _)
                | (Self::ActiveOnly, LifecycleStage::Active)
                | (Self::DeletedOnly, LifecycleStage::Deleted)
        )
    }

    /// Stage names admitted by this view, for SQL `IN` conditions.
    #[must_use]
    pub fn stages(self) -> Vec<&'static str> {
        match self {
            Self::ActiveOnly => vec!["active"],
            Self::DeletedOnly => vec!["deleted"],
            Self::All => vec!["active", "deleted"],
        }
    }
}
