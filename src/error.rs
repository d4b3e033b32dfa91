//! Error types for rastro-db
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// rastro-db error types
///
/// Exactly five kinds are exposed to callers. Backend-specific failures
/// (`rusqlite`) never cross the store boundary unwrapped; they surface as
/// [`Error::Internal`].
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed name, key, value, or request parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Duplicate experiment name or conflicting param value
    #[error("{0}")]
    AlreadyExists(String),

    /// Missing experiment, run, or tag
    #[error("{0}")]
    NotFound(String),

    /// Operation attempted on the wrong lifecycle stage, or multiple rows
    /// found where at most one was expected (a data-integrity bug)
    #[error("{0}")]
    InvalidState(String),

    /// Unexpected failure from the storage layer
    #[error("Internal storage error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

/// Check whether a `rusqlite` error is a uniqueness-constraint violation.
///
/// Only the call sites that can meaningfully disambiguate a constraint
/// violation (param conflict reconciliation, duplicate experiment names)
/// inspect this; everything else is wrapped as [`Error::Internal`].
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}
