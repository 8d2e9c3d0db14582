//! Per-record evaluation: formula values and filter matches. Stateless; nothing here writes config.

pub mod filter;
pub mod formula;

pub use filter::*;
pub use formula::*;

use crate::config::AggregateConfiguration;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One entity record as the application stores it: field id to value.
pub type Record = Map<String, Value>;

/// Value at `path`: an exact key first, then a dotted walk (`address.city`, `emails.0`).
pub fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    if let Some(v) = record.get(path) {
        return Some(v);
    }
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

const OBJECT_TEXT_KEYS: &[&str] = &["value", "label", "email", "phone", "url", "name"];

/// Text form of a value; lists (multiple emails, multi-selects) yield one entry per item.
pub fn value_texts(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Number(n) => vec![n.to_string()],
        Value::Bool(b) => vec![b.to_string()],
        Value::Array(items) => items.iter().flat_map(value_texts).collect(),
        Value::Object(map) => OBJECT_TEXT_KEYS
            .iter()
            .find_map(|k| map.get(*k))
            .map(value_texts)
            .unwrap_or_default(),
    }
}

/// Calendar date of `YYYY-MM-DD`, RFC 3339 or a naive `YYYY-MM-DDTHH:MM:SS` string.
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|d| d.date())
        })
}

/// Number in a record string: thousands separators and a leading currency sign are tolerated.
pub(crate) fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim().trim_start_matches(['$', '€', '£']);
    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Filter match and formula values for one record of a batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEvaluation {
    pub index: usize,
    pub matched: bool,
    pub formulas: BTreeMap<String, FormulaValue>,
}

/// Evaluate every formula field and the filter group for each record. A bad record or
/// formula only affects its own entry.
pub fn evaluate_records(
    config: &AggregateConfiguration,
    records: &[Record],
    group: &FilterGroup,
) -> Vec<RecordEvaluation> {
    let filters = FilterEngine::new(&config.columns);
    let formulas = FormulaEvaluator::new(&config.columns);
    let formula_ids: Vec<&str> = config
        .columns
        .ordered()
        .into_iter()
        .filter(|d| d.field_type.expression().is_some())
        .map(|d| d.id.as_str())
        .collect();

    records
        .iter()
        .enumerate()
        .map(|(index, record)| RecordEvaluation {
            index,
            matched: filters.matches_group(record, group),
            formulas: formula_ids
                .iter()
                .map(|id| (id.to_string(), formulas.evaluate_field(id, record)))
                .collect(),
        })
        .collect()
}

/// Records that satisfy the group, in input order.
pub fn filter_records<'r>(
    config: &AggregateConfiguration,
    records: &'r [Record],
    group: &FilterGroup,
) -> Vec<&'r Record> {
    let filters = FilterEngine::new(&config.columns);
    records.iter().filter(|r| filters.matches_group(r, group)).collect()
}
