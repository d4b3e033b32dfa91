//! In-memory run search: filtering, ordering, pagination
//!
//! Search works over fully materialized runs fetched in one session. The
//! filter, sort, and pagination steps are pure functions over that snapshot,
//! so the database sees only a simple stage-and-experiment query regardless
//! of filter complexity. This trades memory for planner independence; the
//! pieces are separable if a pushdown evaluator ever replaces them.

pub mod filter;

pub use filter::{parse_filter, Comparator, FilterClause, FilterEntity, FilterValue};

use crate::entities::Run;
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Hard ceiling on `max_results` for a single search page.
pub const SEARCH_MAX_RESULTS_THRESHOLD: usize = 50_000;

/// One page of search results.
#[derive(Debug, Clone)]
pub struct RunsPage {
    /// Runs on this page, in requested order.
    pub runs: Vec<Run>,
    /// Token for the next page; `None` when this page is the last.
    pub next_page_token: Option<String>,
}

// =============================================================================
// Ordering
// =============================================================================

/// Sort key of one `order_by` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    /// Latest value of a metric (numeric).
    Metric(String),
    /// Param value (string).
    Param(String),
    /// Tag value (string).
    Tag(String),
    /// Run attribute (`start_time`, `status`, ...).
    Attribute(String),
}

/// One parsed `order_by` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByClause {
    /// What to sort on.
    pub key: OrderKey,
    /// Sort direction; defaults to ascending.
    pub ascending: bool,
}

/// Parse an `order_by` entry: `<entity>.<key> [ASC|DESC]`.
///
/// # Errors
///
/// [`Error::InvalidParameter`] for a malformed entry, unknown entity, or
/// unknown attribute.
pub fn parse_order_by(clause: &str) -> Result<OrderByClause> {
    let trimmed = clause.trim();
    let bad = || {
        Error::InvalidParameter(format!(
            "Malformed order_by clause: '{trimmed}'. Expected '<entity>.<key> [ASC|DESC]'"
        ))
    };

    let (field, ascending) = match trimmed.rsplit_once(char::is_whitespace) {
        Some((field, dir)) if dir.eq_ignore_ascii_case("asc") => (field.trim_end(), true),
        Some((field, dir)) if dir.eq_ignore_ascii_case("desc") => (field.trim_end(), false),
        _ => (trimmed, true),
    };

    let (entity_name, raw_key) = field.split_once('.').ok_or_else(bad)?;
    let key = strip_key_quotes(raw_key.trim()).ok_or_else(bad)?;
    if key.is_empty() {
        return Err(bad());
    }

    let key = match filter::parse_entity(entity_name.trim())? {
        FilterEntity::Metric => OrderKey::Metric(key),
        FilterEntity::Param => OrderKey::Param(key),
        FilterEntity::Tag => OrderKey::Tag(key),
        FilterEntity::Attribute => {
            if !matches!(
                key.as_str(),
                "start_time" | "end_time" | "run_id" | "run_uuid" | "status" | "user_id"
                    | "artifact_uri"
            ) {
                return Err(Error::InvalidParameter(format!(
                    "Invalid attribute key '{key}' in order_by clause"
                )));
            }
            OrderKey::Attribute(key)
        }
    };
    Ok(OrderByClause { key, ascending })
}

fn strip_key_quotes(s: &str) -> Option<String> {
    let first = s.chars().next()?;
    if matches!(first, '"' | '`') {
        let inner = s.strip_prefix(first)?.strip_suffix(first)?;
        Some(inner.to_string())
    } else {
        Some(s.to_string())
    }
}

/// Value extracted from a run for one sort key.
enum SortValue {
    Number(f64),
    Text(String),
}

fn sort_value(run: &Run, key: &OrderKey) -> Option<SortValue> {
    match key {
        OrderKey::Metric(k) => run.latest_metric(k).map(|m| SortValue::Number(m.value)),
        OrderKey::Param(k) => run.param(k).map(|v| SortValue::Text(v.to_string())),
        OrderKey::Tag(k) => run.tag(k).map(|v| SortValue::Text(v.to_string())),
        OrderKey::Attribute(k) => match k.as_str() {
            #[allow(clippy::cast_precision_loss)]
            "start_time" => Some(SortValue::Number(run.info.start_time as f64)),
            #[allow(clippy::cast_precision_loss)]
            "end_time" => run.info.end_time.map(|t| SortValue::Number(t as f64)),
            "run_id" | "run_uuid" => Some(SortValue::Text(run.info.run_id.clone())),
            "status" => Some(SortValue::Text(run.info.status.as_str().to_string())),
            "user_id" => Some(SortValue::Text(run.info.user_id.clone())),
            "artifact_uri" => Some(SortValue::Text(run.info.artifact_uri.clone())),
            _ => None,
        },
    }
}

fn compare_sort_values(a: &SortValue, b: &SortValue) -> Ordering {
    match (a, b) {
        (SortValue::Number(x), SortValue::Number(y)) => x.total_cmp(y),
        (SortValue::Text(x), SortValue::Text(y)) => x.cmp(y),
        // Mixed types cannot arise for one key; treat as equal
        _ => Ordering::Equal,
    }
}

/// Sort runs by the given clauses, in place.
///
/// Runs missing a sort key collate after runs that have it, regardless of
/// direction. Ties across all clauses break on `start_time` descending, then
/// `run_id` ascending, so the full ordering is total and pagination over it
/// is stable.
pub fn sort_runs(runs: &mut [Run], order_by: &[OrderByClause]) {
    runs.sort_by(|a, b| {
        for clause in order_by {
            let ordering = match (sort_value(a, &clause.key), sort_value(b, &clause.key)) {
                (Some(x), Some(y)) => {
                    let cmp = compare_sort_values(&x, &y);
                    if clause.ascending {
                        cmp
                    } else {
                        cmp.reverse()
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        b.info
            .start_time
            .cmp(&a.info.start_time)
            .then_with(|| a.info.run_id.cmp(&b.info.run_id))
    });
}

// =============================================================================
// Pagination
// =============================================================================

#[derive(Serialize, Deserialize)]
struct PageToken {
    offset: usize,
}

/// Decode an opaque page token into an offset.
///
/// # Errors
///
/// [`Error::InvalidParameter`] when the token is not valid base64-encoded
/// JSON of the expected shape.
pub fn decode_page_token(token: &str) -> Result<usize> {
    let invalid = || Error::InvalidParameter(format!("Invalid page token: '{token}'"));
    let bytes = BASE64.decode(token).map_err(|_| invalid())?;
    let parsed: PageToken = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
    Ok(parsed.offset)
}

/// Encode an offset as an opaque page token.
#[must_use]
pub fn encode_page_token(offset: usize) -> String {
    let json = serde_json::to_vec(&PageToken { offset }).unwrap_or_default();
    BASE64.encode(json)
}

/// Take one page of `max_results` runs starting at `offset`.
///
/// Returns the page and a token for the next page when runs remain past it.
/// An offset beyond the end yields an empty final page.
#[must_use]
pub fn paginate(mut runs: Vec<Run>, offset: usize, max_results: usize) -> RunsPage {
    let total = runs.len();
    let start = offset.min(total);
    let end = start.saturating_add(max_results).min(total);
    runs.drain(..start);
    runs.truncate(end - start);

    let next_page_token = (end < total).then(|| encode_page_token(end));
    RunsPage {
        runs,
        next_page_token,
    }
}
