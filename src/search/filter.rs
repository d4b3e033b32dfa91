//! Filter predicate language over materialized runs
//!
//! A small comparison language applied in memory to already-fetched runs:
//! clauses like `metrics.accuracy > 0.9`, `params.lr = '0.001'`,
//! `tags."release" != 'rc'`, or `attributes.status = 'FINISHED'`, joined by
//! `AND`. Metric and time attributes compare numerically; params, tags, and
//! string attributes compare as strings and admit only `=` / `!=`.

use crate::entities::Run;
use crate::error::{Error, Result};

/// Comparison operator in a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `=`
    Eq,
    /// `!=`
    Ne,
}

impl Comparator {
    fn apply<T: PartialOrd>(self, left: &T, right: &T) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Gte => left >= right,
            Self::Lt => left < right,
            Self::Lte => left <= right,
            Self::Eq => left == right,
            Self::Ne => left != right,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "=",
            Self::Ne => "!=",
        }
    }
}

/// Which entity collection a clause inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterEntity {
    /// Latest metric values (numeric).
    Metric,
    /// Params (string).
    Param,
    /// Run tags (string).
    Tag,
    /// Run attributes (`status`, `user_id`, `start_time`, ...).
    Attribute,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Unquoted numeric literal.
    Number(f64),
    /// Quoted string literal.
    Text(String),
}

/// One parsed comparison clause.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    /// Entity collection inspected.
    pub entity: FilterEntity,
    /// Key within the collection.
    pub key: String,
    /// Comparison operator.
    pub comparator: Comparator,
    /// Literal to compare against.
    pub value: FilterValue,
}

impl FilterClause {
    /// Evaluate this clause against a materialized run.
    ///
    /// A run missing the referenced key never matches.
    #[must_use]
    pub fn matches(&self, run: &Run) -> bool {
        match (self.entity, &self.value) {
            (FilterEntity::Metric, FilterValue::Number(expected)) => run
                .latest_metric(&self.key)
                .is_some_and(|m| self.comparator.apply(&m.value, expected)),
            (FilterEntity::Param, FilterValue::Text(expected)) => run
                .param(&self.key)
                .is_some_and(|v| self.comparator.apply(&v, &expected.as_str())),
            (FilterEntity::Tag, FilterValue::Text(expected)) => run
                .tag(&self.key)
                .is_some_and(|v| self.comparator.apply(&v, &expected.as_str())),
            (FilterEntity::Attribute, expected) => self.matches_attribute(run, expected),
            // Type mismatches are rejected at parse time
            _ => false,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn matches_attribute(&self, run: &Run, expected: &FilterValue) -> bool {
        match (self.key.as_str(), expected) {
            ("start_time", FilterValue::Number(n)) => {
                self.comparator.apply(&(run.info.start_time as f64), n)
            }
            ("end_time", FilterValue::Number(n)) => run
                .info
                .end_time
                .is_some_and(|t| self.comparator.apply(&(t as f64), n)),
            ("run_id" | "run_uuid", FilterValue::Text(s)) => {
                self.comparator.apply(&run.info.run_id.as_str(), &s.as_str())
            }
            ("status", FilterValue::Text(s)) => self
                .comparator
                .apply(&run.info.status.as_str(), &s.as_str()),
            ("user_id", FilterValue::Text(s)) => {
                self.comparator.apply(&run.info.user_id.as_str(), &s.as_str())
            }
            ("artifact_uri", FilterValue::Text(s)) => self
                .comparator
                .apply(&run.info.artifact_uri.as_str(), &s.as_str()),
            _ => false,
        }
    }
}

/// Parse a filter string into clauses.
///
/// An empty or absent filter yields no clauses (matches everything).
///
/// # Errors
///
/// [`Error::InvalidParameter`] for malformed clauses, unknown entities, or
/// comparator/value combinations the entity does not support.
pub fn parse_filter(filter_string: &str) -> Result<Vec<FilterClause>> {
    let trimmed = filter_string.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    split_and(trimmed).iter().map(|c| parse_clause(c)).collect()
}

/// Split on the `AND` keyword (case-insensitive), outside quotes.
fn split_and(s: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut iter = s.char_indices();

    while let Some((i, c)) = iter.next() {
        if quote.is_none() && c.is_whitespace() {
            let rest = &s[i + c.len_utf8()..];
            if rest.is_char_boundary(3)
                && rest.len() > 3
                && rest[..3].eq_ignore_ascii_case("and")
                && rest[3..].starts_with(char::is_whitespace)
            {
                clauses.push(current.clone());
                current.clear();
                // Consume "and" plus the whitespace that follows it
                for _ in 0..4 {
                    iter.next();
                }
                continue;
            }
        }
        match quote {
            Some(q) if c == q => quote = None,
            None if matches!(c, '\'' | '"' | '`') => quote = Some(c),
            _ => {}
        }
        current.push(c);
    }
    clauses.push(current);
    clauses
}

fn parse_clause(clause: &str) -> Result<FilterClause> {
    let bad = || {
        Error::InvalidParameter(format!(
            "Malformed filter clause: '{}'. Expected '<entity>.<key> <comparator> <value>'",
            clause.trim()
        ))
    };

    let (lhs, comparator, rhs) = split_comparator(clause).ok_or_else(bad)?;
    let (entity_name, raw_key) = lhs.trim().split_once('.').ok_or_else(bad)?;
    let entity = parse_entity(entity_name.trim())?;
    let key = unquote(raw_key.trim(), &['"', '`']).ok_or_else(bad)?;
    if key.is_empty() {
        return Err(bad());
    }
    let value = parse_value(rhs.trim()).ok_or_else(bad)?;

    // Entity/type discipline: metrics compare numerically, strings admit
    // only equality comparators.
    match (entity, &value) {
        (FilterEntity::Metric, FilterValue::Text(_)) => {
            return Err(Error::InvalidParameter(format!(
                "Expected a numeric value for metric '{key}'"
            )));
        }
        (FilterEntity::Param | FilterEntity::Tag, FilterValue::Number(_)) => {
            return Err(Error::InvalidParameter(format!(
                "Expected a quoted string value for '{key}'"
            )));
        }
        (FilterEntity::Param | FilterEntity::Tag, FilterValue::Text(_))
            if !matches!(comparator, Comparator::Eq | Comparator::Ne) =>
        {
            return Err(Error::InvalidParameter(format!(
                "Invalid comparator '{}' for string filter on '{key}'; only = and != are \
                 supported",
                comparator.symbol()
            )));
        }
        (FilterEntity::Attribute, _) => validate_attribute_clause(&key, comparator, &value)?,
        _ => {}
    }

    Ok(FilterClause {
        entity,
        key,
        comparator,
        value,
    })
}

fn validate_attribute_clause(
    key: &str,
    comparator: Comparator,
    value: &FilterValue,
) -> Result<()> {
    match key {
        "start_time" | "end_time" => match value {
            FilterValue::Number(_) => Ok(()),
            FilterValue::Text(_) => Err(Error::InvalidParameter(format!(
                "Expected a numeric value for attribute '{key}'"
            ))),
        },
        "run_id" | "run_uuid" | "status" | "user_id" | "artifact_uri" => {
            if matches!(value, FilterValue::Number(_)) {
                return Err(Error::InvalidParameter(format!(
                    "Expected a quoted string value for attribute '{key}'"
                )));
            }
            if !matches!(comparator, Comparator::Eq | Comparator::Ne) {
                return Err(Error::InvalidParameter(format!(
                    "Invalid comparator '{}' for string attribute '{key}'",
                    comparator.symbol()
                )));
            }
            Ok(())
        }
        other => Err(Error::InvalidParameter(format!(
            "Invalid attribute key '{other}'"
        ))),
    }
}

pub(crate) fn parse_entity(name: &str) -> Result<FilterEntity> {
    match name {
        "metric" | "metrics" => Ok(FilterEntity::Metric),
        "param" | "params" | "parameter" | "parameters" => Ok(FilterEntity::Param),
        "tag" | "tags" => Ok(FilterEntity::Tag),
        "attr" | "attribute" | "attributes" | "run" => Ok(FilterEntity::Attribute),
        other => Err(Error::InvalidParameter(format!(
            "Invalid entity type '{other}'. Valid values are metrics, params, tags, and \
             attributes"
        ))),
    }
}

/// Split a clause at its comparator, ignoring comparator characters inside
/// quoted keys or quoted values.
fn split_comparator(clause: &str) -> Option<(&str, Comparator, &str)> {
    let mut quote: Option<char> = None;
    for (i, c) in clause.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        if matches!(c, '\'' | '"' | '`') {
            quote = Some(c);
            continue;
        }
        if matches!(c, '<' | '>' | '!' | '=') {
            let rest = &clause[i..];
            // Two-character operators are matched before their one-character
            // prefixes.
            for (symbol, comparator) in [
                (">=", Comparator::Gte),
                ("<=", Comparator::Lte),
                ("!=", Comparator::Ne),
                (">", Comparator::Gt),
                ("<", Comparator::Lt),
                ("=", Comparator::Eq),
            ] {
                if let Some(rhs) = rest.strip_prefix(symbol) {
                    return Some((&clause[..i], comparator, rhs));
                }
            }
            // A bare '!' matches no operator; keep scanning
        }
    }
    None
}

/// Strip a matching pair of surrounding quotes, if present.
///
/// Returns `None` for an unterminated quote.
fn unquote(s: &str, quotes: &[char]) -> Option<String> {
    let first = s.chars().next()?;
    if quotes.contains(&first) {
        let inner = s.strip_prefix(first)?.strip_suffix(first)?;
        Some(inner.to_string())
    } else {
        Some(s.to_string())
    }
}

fn parse_value(s: &str) -> Option<FilterValue> {
    let first = s.chars().next()?;
    if matches!(first, '\'' | '"') {
        let inner = s.strip_prefix(first)?.strip_suffix(first)?;
        Some(FilterValue::Text(inner.to_string()))
    } else {
        s.parse::<f64>().ok().map(FilterValue::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metric_clause() {
        let clauses = parse_filter("metrics.accuracy > 0.9").unwrap();
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].entity, FilterEntity::Metric);
        assert_eq!(clauses[0].key, "accuracy");
        assert_eq!(clauses[0].comparator, Comparator::Gt);
        assert_eq!(clauses[0].value, FilterValue::Number(0.9));
    }

    #[test]
    fn test_parse_conjunction() {
        let clauses =
            parse_filter("metrics.acc >= 0.5 AND params.lr = '0.001' and tags.stage != 'dev'")
                .unwrap();
        assert_eq!(clauses.len(), 3);
        assert_eq!(clauses[1].entity, FilterEntity::Param);
        assert_eq!(clauses[2].comparator, Comparator::Ne);
    }

    #[test]
    fn test_parse_quoted_key() {
        let clauses = parse_filter("params.\"learning rate\" = '0.1'").unwrap();
        assert_eq!(clauses[0].key, "learning rate");
        let clauses = parse_filter("metrics.`val/loss` < 1.0").unwrap();
        assert_eq!(clauses[0].key, "val/loss");
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(parse_filter("").unwrap().is_empty());
        assert!(parse_filter("   ").unwrap().is_empty());
    }

    #[test]
    fn test_reject_unknown_entity() {
        assert!(parse_filter("gizmos.x = 'y'").is_err());
    }

    #[test]
    fn test_reject_string_comparator_on_metric() {
        assert!(parse_filter("metrics.acc > 'high'").is_err());
    }

    #[test]
    fn test_reject_ordering_comparator_on_param() {
        assert!(parse_filter("params.lr > '0.1'").is_err());
        assert!(parse_filter("params.lr = 0.1").is_err());
    }

    #[test]
    fn test_reject_malformed_clause() {
        assert!(parse_filter("metrics.acc").is_err());
        assert!(parse_filter("acc > 0.9").is_err());
        assert!(parse_filter("metrics. > 0.9").is_err());
    }

    #[test]
    fn test_attribute_clauses() {
        assert!(parse_filter("attributes.status = 'FINISHED'").is_ok());
        assert!(parse_filter("attributes.start_time >= 1000").is_ok());
        assert!(parse_filter("attributes.status > 'A'").is_err());
        assert!(parse_filter("attributes.flavor = 'x'").is_err());
    }

    #[test]
    fn test_quoted_value_may_contain_comparator_characters() {
        let clauses = parse_filter("params.note = 'a > b'").unwrap();
        assert_eq!(clauses[0].comparator, Comparator::Eq);
        assert_eq!(clauses[0].value, FilterValue::Text("a > b".into()));

        let clauses = parse_filter("tags.op = '<'").unwrap();
        assert_eq!(clauses[0].value, FilterValue::Text("<".into()));

        let clauses = parse_filter("params.expr != 'x = y'").unwrap();
        assert_eq!(clauses[0].comparator, Comparator::Ne);
        assert_eq!(clauses[0].value, FilterValue::Text("x = y".into()));
    }

    #[test]
    fn test_quoted_key_may_contain_comparator_characters() {
        let clauses = parse_filter("metrics.`a<b` > 1.0").unwrap();
        assert_eq!(clauses[0].key, "a<b");
        assert_eq!(clauses[0].comparator, Comparator::Gt);
        assert_eq!(clauses[0].value, FilterValue::Number(1.0));
    }

    #[test]
    fn test_quoted_and_is_not_a_separator() {
        let clauses = parse_filter("params.note = 'fish and chips'").unwrap();
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].value, FilterValue::Text("fish and chips".into()));
    }
}
