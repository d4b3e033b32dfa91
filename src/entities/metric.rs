//! Metric - append-only time-series facts and their derived latest view

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single metric fact.
///
/// Metric facts are append-only: multiple facts may share the same
/// `(run_id, key)` pair, forming a time series ordered by `(step, timestamp)`.
///
/// The database column cannot represent non-finite 64-bit floats, so values
/// are normalized before storage: `NaN` is stored as `0.0` with
/// `is_nan = true`, and `±∞` is clamped to `f64::MAX` / `f64::MIN`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    /// Metric name (e.g. "loss", "accuracy").
    pub key: String,
    /// Metric value as stored (already normalized).
    pub value: f64,
    /// Wall-clock time in milliseconds since the epoch.
    pub timestamp: i64,
    /// Training step or epoch number.
    pub step: i64,
    /// True when the logged value was `NaN`.
    pub is_nan: bool,
}

impl Metric {
    /// Create a metric fact, normalizing non-finite values.
    #[must_use]
    pub fn new(key: impl Into<String>, value: f64, timestamp: i64, step: i64) -> Self {
        let (value, is_nan) = normalize_value(value);
        Self {
            key: key.into(),
            value,
            timestamp,
            step,
            is_nan,
        }
    }

    /// Ordering tuple used to decide which fact is the most recent.
    ///
    /// Lexicographic over `(step, timestamp, value)`; ties on all three are
    /// equal facts for latest-view purposes.
    #[must_use]
    pub fn recency_cmp(&self, other: &Self) -> Ordering {
        (self.step, self.timestamp)
            .cmp(&(other.step, other.timestamp))
            .then_with(|| self.value.total_cmp(&other.value))
    }
}

/// The most recent metric fact for a `(run_id, key)` pair.
///
/// Derived view maintained transactionally alongside metric inserts; never
/// written independently by clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatestMetric {
    /// Metric name.
    pub key: String,
    /// Value of the most recent fact.
    pub value: f64,
    /// Timestamp of the most recent fact.
    pub timestamp: i64,
    /// Step of the most recent fact.
    pub step: i64,
    /// Whether the most recent fact was logged as `NaN`.
    pub is_nan: bool,
}

/// Normalize a metric value for column storage.
///
/// Returns `(stored_value, is_nan)`.
#[must_use]
pub(crate) fn normalize_value(value: f64) -> (f64, bool) {
    if value.is_nan() {
        (0.0, true)
    } else if value == f64::INFINITY {
        (f64::MAX, false)
    } else if value == f64::NEG_INFINITY {
        (f64::MIN, false)
    } else {
        (value, false)
    }
}
