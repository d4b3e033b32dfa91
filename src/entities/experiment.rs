//! Experiment - root entity for experiment tracking

use super::{ExperimentTag, LifecycleStage};
use serde::{Deserialize, Serialize};

/// A tracked experiment.
///
/// This is the root entity in the tracking schema. Each experiment owns
/// multiple runs. Identity is assigned by the store; the id `"0"` is reserved
/// for the permanently present default experiment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Experiment {
    /// Store-assigned unique identifier.
    pub experiment_id: String,
    /// Human-readable name, unique across experiments.
    pub name: String,
    /// Root URI under which run artifacts for this experiment are located.
    pub artifact_location: String,
    /// Current lifecycle stage.
    pub lifecycle_stage: LifecycleStage,
    /// Experiment-level tags.
    pub tags: Vec<ExperimentTag>,
}

impl Experiment {
    /// Look up a tag value by key.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}
