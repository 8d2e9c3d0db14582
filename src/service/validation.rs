//! Record validation against the synchronized form layout and field types.

use crate::config::{AggregateConfiguration, FieldDefinition, FieldType};
use crate::eval::{parse_date, parse_number, value_texts, Record};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    fn new(field: &str, message: impl Into<String>) -> Self {
        FieldViolation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub struct RecordValidator;

impl RecordValidator {
    /// Check a full record. Visible required form items must have a value; every present
    /// value must suit its field type.
    pub fn validate(config: &AggregateConfiguration, record: &Record) -> Vec<FieldViolation> {
        let mut out = Vec::new();
        for item in config.layout.form_layout.iter().filter(|i| i.visible && i.required) {
            if record.get(&item.id).map_or(true, is_blank) {
                out.push(FieldViolation::new(&item.id, format!("{} is required", label(config, &item.id))));
            }
        }
        out.extend(Self::validate_partial(config, record));
        out
    }

    /// Check only the values present (for edits of a subset of fields). Required is not enforced.
    pub fn validate_partial(config: &AggregateConfiguration, record: &Record) -> Vec<FieldViolation> {
        record
            .iter()
            .filter_map(|(id, value)| {
                let def = config.columns.get(id)?;
                if def.is_system() || is_blank(value) {
                    return None;
                }
                check_value(def, value).err()
            })
            .collect()
    }
}

fn label<'a>(config: &'a AggregateConfiguration, id: &'a str) -> &'a str {
    config
        .columns
        .get(id)
        .map(|d| d.label.as_str())
        .filter(|l| !l.is_empty())
        .unwrap_or(id)
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_blank),
        _ => false,
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"))
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(https?://)?[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+(:\d+)?(/\S*)?$").expect("valid url pattern"))
}

fn check_value(def: &FieldDefinition, value: &Value) -> Result<(), FieldViolation> {
    let name = if def.label.is_empty() { def.id.as_str() } else { def.label.as_str() };
    let texts = value_texts(value);
    if value.is_array() && !def.field_type.is_multi_value() {
        return Err(FieldViolation::new(&def.id, format!("{} accepts a single value", name)));
    }
    match &def.field_type {
        FieldType::Email { .. } => {
            if let Some(bad) = texts.iter().find(|t| !email_pattern().is_match(t.trim())) {
                return Err(FieldViolation::new(&def.id, format!("{} must be a valid email, got '{}'", name, bad)));
            }
        }
        FieldType::Url => {
            if let Some(bad) = texts.iter().find(|t| !url_pattern().is_match(t.trim())) {
                return Err(FieldViolation::new(&def.id, format!("{} must be a valid URL, got '{}'", name, bad)));
            }
        }
        FieldType::Date => {
            if let Some(bad) = texts.iter().find(|t| parse_date(t).is_none()) {
                return Err(FieldViolation::new(&def.id, format!("{} must be a date, got '{}'", name, bad)));
            }
        }
        FieldType::Number | FieldType::Currency { .. } => {
            let numeric = value.is_number() || texts.iter().all(|t| parse_number(t).is_some());
            if !numeric {
                return Err(FieldViolation::new(&def.id, format!("{} must be a number", name)));
            }
        }
        FieldType::Select { options, .. } if !options.is_empty() => {
            if let Some(bad) = texts.iter().find(|t| !options.contains(t)) {
                return Err(FieldViolation::new(
                    &def.id,
                    format!("{} must be one of: {:?}, got '{}'", name, options.iter().take(5).collect::<Vec<_>>(), bad),
                ));
            }
        }
        FieldType::Formula { .. } => {
            return Err(FieldViolation::new(&def.id, format!("{} is computed and cannot be set", name)));
        }
        _ => {}
    }
    Ok(())
}
