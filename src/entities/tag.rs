//! Tags - mutable key/value annotations for runs and experiments

use serde::{Deserialize, Serialize};

/// A run tag. Setting an existing key overwrites the value (upsert).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunTag {
    /// Tag name.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl RunTag {
    /// Create a run tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An experiment tag. Same upsert semantics as [`RunTag`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentTag {
    /// Tag name.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl ExperimentTag {
    /// Create an experiment tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
