//! Batch logging with per-item atomicity
//!
//! A batch is a single logical client-facing operation but NOT a single
//! transaction: each param, metric, and tag is applied through its own
//! session. Callers must treat a batch failure as "some items applied".
//! Whole-batch transactions would hold the latest-metric write lock for the
//! duration of the batch; per-item boundaries keep that lock scope to one
//! row in one short transaction.

use super::SqliteStore;
use crate::entities::{Metric, Param, RunTag};
use crate::error::Result;
use crate::session::check_run_is_active;
use crate::validation;

impl SqliteStore {
    /// Apply a heterogeneous batch of params, metrics, and tags to a run.
    ///
    /// The run's existence and active stage are verified up front in a
    /// session that is released immediately; size limits and per-item
    /// formats are validated before any item is applied. Items are then
    /// applied params first, then metrics, then tags, each as an independent
    /// single-item operation. A failure partway through leaves earlier items
    /// committed; the per-item error propagates unchanged.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`](crate::Error::InvalidParameter) when a
    /// size limit is exceeded or an item is malformed, raised before any
    /// write; otherwise whatever the failing single-item operation raised.
    pub fn log_batch(
        &self,
        run_id: &str,
        metrics: Vec<Metric>,
        params: Vec<Param>,
        tags: Vec<RunTag>,
    ) -> Result<()> {
        validation::validate_batch_log_limits(&metrics, &params, &tags)?;
        validation::validate_batch_log_data(&metrics, &params, &tags)?;

        self.with_session(|session| {
            let run = session.get_run(run_id)?;
            check_run_is_active(&run)
        })?;

        for param in params {
            self.log_param(run_id, param)?;
        }
        for metric in metrics {
            self.log_metric(run_id, metric)?;
        }
        for tag in tags {
            self.set_tag(run_id, tag)?;
        }
        Ok(())
    }
}
