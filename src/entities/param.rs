//! Param - immutable key/value facts for runs

use serde::{Deserialize, Serialize};

/// A run parameter.
///
/// Write-once: a `(run_id, key)` pair may be logged at most once. Re-logging
/// the same value is an idempotent no-op; a different value is a conflict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Param {
    /// Parameter name.
    pub key: String,
    /// Parameter value.
    pub value: String,
}

impl Param {
    /// Create a param fact.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
