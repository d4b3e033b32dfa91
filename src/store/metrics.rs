//! Metric logging and latest-value view maintenance
//!
//! Metric facts are append-only. The `latest_metrics` view is maintained in
//! the same transaction as the fact insert so common reads never scan the
//! full history; `BEGIN IMMEDIATE` serializes the compare-and-swap between
//! concurrent writers to the same `(run_id, key)`.

use super::SqliteStore;
use crate::entities::metric::normalize_value;
use crate::entities::Metric;
use crate::error::Result;
use crate::session::{check_run_is_active, Session};
use crate::validation;
use rusqlite::{params, OptionalExtension};
use std::cmp::Ordering;

impl SqliteStore {
    /// Log a metric fact for an active run.
    ///
    /// Non-finite values are normalized before storage: `NaN` becomes `0`
    /// with `is_nan = true`, `±∞` clamps to the finite `f64` extremes.
    /// Logging a byte-identical fact twice is idempotent: the duplicate is
    /// treated as already logged and the latest view is left untouched.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`](crate::Error::InvalidParameter) for a bad
    /// key or negative timestamp, raised before any database interaction;
    /// [`Error::InvalidState`](crate::Error::InvalidState) for a deleted run.
    pub fn log_metric(&self, run_id: &str, metric: Metric) -> Result<()> {
        validation::validate_metric(&metric)?;
        // Re-normalize defensively: entity fields are public, so the value
        // may not have passed through Metric::new.
        let (value, was_nan) = normalize_value(metric.value);
        let metric = Metric {
            value,
            is_nan: metric.is_nan || was_nan,
            ..metric
        };

        self.with_session(|session| {
            let run = session.get_run(run_id)?;
            check_run_is_active(&run)?;

            let just_created = get_or_create_metric(session, run_id, &metric)?;
            // The latest view already accounts for a fact that was present
            // before this call.
            if just_created {
                update_latest_metric_if_necessary(session, run_id, &metric)?;
            }
            Ok(())
        })
    }

    /// Return all metric facts for `(run_id, key)` in logging order.
    ///
    /// # Errors
    ///
    /// [`Error::Internal`](crate::Error::Internal) on storage failure. A
    /// missing run or key yields an empty history.
    pub fn get_metric_history(&self, run_id: &str, metric_key: &str) -> Result<Vec<Metric>> {
        self.with_session(|session| {
            let mut stmt = session.conn().prepare(
                "SELECT key, value, timestamp, step, is_nan
                 FROM metrics WHERE run_uuid = ?1 AND key = ?2 ORDER BY rowid",
            )?;
            let metrics = stmt
                .query_map(params![run_id, metric_key], |row| {
                    Ok(Metric {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        timestamp: row.get(2)?,
                        step: row.get(3)?,
                        is_nan: row.get::<_, i64>(4)? != 0,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(metrics)
        })
    }
}

/// Insert the metric fact unless a byte-identical one exists.
///
/// Returns whether a row was created. Safe as a read-then-write only because
/// the surrounding `BEGIN IMMEDIATE` transaction holds the write lock and the
/// six-column primary key backs the uniqueness invariant.
fn get_or_create_metric(session: &Session<'_>, run_id: &str, metric: &Metric) -> Result<bool> {
    let existing: i64 = session.conn().query_row(
        "SELECT COUNT(*) FROM metrics
         WHERE run_uuid = ?1 AND key = ?2 AND value = ?3 AND timestamp = ?4
           AND step = ?5 AND is_nan = ?6",
        params![
            run_id,
            metric.key,
            metric.value,
            metric.timestamp,
            metric.step,
            i64::from(metric.is_nan)
        ],
        |row| row.get(0),
    )?;
    if existing > 0 {
        return Ok(false);
    }
    session.conn().execute(
        "INSERT INTO metrics (run_uuid, key, value, timestamp, step, is_nan)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run_id,
            metric.key,
            metric.value,
            metric.timestamp,
            metric.step,
            i64::from(metric.is_nan)
        ],
    )?;
    Ok(true)
}

/// Replace the latest-metric row for `(run_id, key)` when the new fact is
/// strictly more recent under the `(step, timestamp, value)` ordering.
fn update_latest_metric_if_necessary(
    session: &Session<'_>,
    run_id: &str,
    metric: &Metric,
) -> Result<()> {
    let current: Option<(i64, i64, f64)> = session
        .conn()
        .query_row(
            "SELECT step, timestamp, value FROM latest_metrics
             WHERE run_uuid = ?1 AND key = ?2",
            params![run_id, metric.key],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let is_more_recent = current.map_or(true, |(step, timestamp, value)| {
        (metric.step, metric.timestamp)
            .cmp(&(step, timestamp))
            .then_with(|| metric.value.total_cmp(&value))
            == Ordering::Greater
    });

    if is_more_recent {
        session.conn().execute(
            "INSERT INTO latest_metrics (run_uuid, key, value, timestamp, step, is_nan)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(run_uuid, key) DO UPDATE SET
                 value = excluded.value,
                 timestamp = excluded.timestamp,
                 step = excluded.step,
                 is_nan = excluded.is_nan",
            params![
                run_id,
                metric.key,
                metric.value,
                metric.timestamp,
                metric.step,
                i64::from(metric.is_nan)
            ],
        )?;
    }
    Ok(())
}
