//! Format validation for entity names, keys, and logged values
//!
//! Validation runs before any database interaction, so malformed input never
//! opens a transaction.

use crate::entities::{Metric, Param, RunTag};
use crate::error::{Error, Result};

/// Maximum length of metric/param/tag keys and experiment names.
pub const MAX_ENTITY_KEY_LENGTH: usize = 250;
/// Maximum length of a param value.
pub const MAX_PARAM_VAL_LENGTH: usize = 500;
/// Maximum length of a tag value.
pub const MAX_TAG_VAL_LENGTH: usize = 5000;

/// Maximum metrics per batch.
pub const MAX_METRICS_PER_BATCH: usize = 1000;
/// Maximum params per batch.
pub const MAX_PARAMS_PER_BATCH: usize = 100;
/// Maximum tags per batch.
pub const MAX_TAGS_PER_BATCH: usize = 100;
/// Maximum total entities per batch.
pub const MAX_ENTITIES_PER_BATCH: usize = 1000;

fn is_valid_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ' | '/')
}

/// Validate a metric/param/tag key.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidParameter(
            "Key cannot be empty".to_string(),
        ));
    }
    if key.len() > MAX_ENTITY_KEY_LENGTH {
        return Err(Error::InvalidParameter(format!(
            "Key '{key}' had length {} but must be at most {MAX_ENTITY_KEY_LENGTH}",
            key.len()
        )));
    }
    if !key.chars().all(is_valid_key_char) {
        return Err(Error::InvalidParameter(format!(
            "Invalid key name: '{key}'. Names may only contain alphanumerics, \
             underscores (_), dashes (-), periods (.), spaces ( ), and slashes (/)"
        )));
    }
    Ok(())
}

/// Validate a metric before logging.
///
/// Value normalization (NaN/infinity) happens separately; any `f64` is an
/// acceptable value here.
pub(crate) fn validate_metric(metric: &Metric) -> Result<()> {
    validate_key(&metric.key)?;
    if metric.timestamp < 0 {
        return Err(Error::InvalidParameter(format!(
            "Metric '{}' has a negative timestamp {}",
            metric.key, metric.timestamp
        )));
    }
    Ok(())
}

/// Validate a param before logging.
pub(crate) fn validate_param(param: &Param) -> Result<()> {
    validate_key(&param.key)?;
    if param.value.len() > MAX_PARAM_VAL_LENGTH {
        return Err(Error::InvalidParameter(format!(
            "Param value for key '{}' had length {} but must be at most {MAX_PARAM_VAL_LENGTH}",
            param.key,
            param.value.len()
        )));
    }
    Ok(())
}

/// Validate a run or experiment tag before setting it.
pub(crate) fn validate_tag(key: &str, value: &str) -> Result<()> {
    validate_key(key)?;
    if value.len() > MAX_TAG_VAL_LENGTH {
        return Err(Error::InvalidParameter(format!(
            "Tag value for key '{key}' had length {} but must be at most {MAX_TAG_VAL_LENGTH}",
            value.len()
        )));
    }
    Ok(())
}

/// Validate an experiment name at creation/rename time.
pub(crate) fn validate_experiment_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidParameter(
            "Invalid experiment name: cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_ENTITY_KEY_LENGTH {
        return Err(Error::InvalidParameter(format!(
            "Invalid experiment name: length {} exceeds {MAX_ENTITY_KEY_LENGTH}",
            name.len()
        )));
    }
    Ok(())
}

/// Validate batch size limits before applying any item.
pub(crate) fn validate_batch_log_limits(
    metrics: &[Metric],
    params: &[Param],
    tags: &[RunTag],
) -> Result<()> {
    if metrics.len() > MAX_METRICS_PER_BATCH {
        return Err(Error::InvalidParameter(format!(
            "A batch may contain at most {MAX_METRICS_PER_BATCH} metrics, got {}",
            metrics.len()
        )));
    }
    if params.len() > MAX_PARAMS_PER_BATCH {
        return Err(Error::InvalidParameter(format!(
            "A batch may contain at most {MAX_PARAMS_PER_BATCH} params, got {}",
            params.len()
        )));
    }
    if tags.len() > MAX_TAGS_PER_BATCH {
        return Err(Error::InvalidParameter(format!(
            "A batch may contain at most {MAX_TAGS_PER_BATCH} tags, got {}",
            tags.len()
        )));
    }
    let total = metrics.len() + params.len() + tags.len();
    if total > MAX_ENTITIES_PER_BATCH {
        return Err(Error::InvalidParameter(format!(
            "A batch may contain at most {MAX_ENTITIES_PER_BATCH} entities in total, got {total}"
        )));
    }
    Ok(())
}

/// Validate per-item formats of an entire batch before applying any item.
pub(crate) fn validate_batch_log_data(
    metrics: &[Metric],
    params: &[Param],
    tags: &[RunTag],
) -> Result<()> {
    for metric in metrics {
        validate_metric(metric)?;
    }
    for param in params {
        validate_param(param)?;
    }
    for tag in tags {
        validate_tag(&tag.key, &tag.value)?;
    }
    Ok(())
}
