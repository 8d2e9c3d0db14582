//! Record filtering: single rules and ALL/ANY groups.

use crate::config::{ColumnRegistry, Comparison};
use crate::eval::formula::{FormulaEvaluator, FormulaValue};
use crate::eval::{lookup, parse_date, value_texts, Record};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    Is,
    IsNot,
}

impl FilterOperator {
    /// Presence tests ignore the rule value and are never inactive.
    pub fn ignores_value(self) -> bool {
        matches!(self, FilterOperator::IsEmpty | FilterOperator::IsNotEmpty)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
}

impl FilterRule {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        FilterRule {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// A rule with a blank value filters nothing.
    pub fn is_active(&self) -> bool {
        self.operator.ignores_value() || !self.value.trim().is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    #[serde(alias = "ALL")]
    All,
    #[serde(alias = "ANY")]
    Any,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub rules: Vec<FilterRule>,
}

impl FilterGroup {
    pub fn all(rules: Vec<FilterRule>) -> Self {
        FilterGroup {
            mode: MatchMode::All,
            rules,
        }
    }

    pub fn any(rules: Vec<FilterRule>) -> Self {
        FilterGroup {
            mode: MatchMode::Any,
            rules,
        }
    }
}

/// Matches records against rules. Field definitions, when given, decide the comparison
/// used by `equals`/`is` and let formula fields be filtered on their computed value.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilterEngine<'a> {
    columns: Option<&'a ColumnRegistry>,
}

impl<'a> FilterEngine<'a> {
    pub fn new(columns: &'a ColumnRegistry) -> Self {
        FilterEngine {
            columns: Some(columns),
        }
    }

    pub fn matches(&self, record: &Record, rule: &FilterRule) -> bool {
        if !rule.is_active() {
            return true;
        }
        let values = self.candidates(record, &rule.field);
        let needle = rule.value.trim();
        match rule.operator {
            FilterOperator::IsEmpty => values.is_empty(),
            FilterOperator::IsNotEmpty => !values.is_empty(),
            FilterOperator::Contains => {
                let needle = needle.to_lowercase();
                values.iter().any(|v| v.to_lowercase().contains(&needle))
            }
            FilterOperator::StartsWith => {
                let needle = needle.to_lowercase();
                values.iter().any(|v| v.to_lowercase().starts_with(&needle))
            }
            FilterOperator::EndsWith => {
                let needle = needle.to_lowercase();
                values.iter().any(|v| v.to_lowercase().ends_with(&needle))
            }
            FilterOperator::Equals | FilterOperator::Is => {
                let cmp = self.comparison(&rule.field);
                values.iter().any(|v| equal(cmp, v, needle))
            }
            FilterOperator::IsNot => {
                let cmp = self.comparison(&rule.field);
                !values.iter().any(|v| equal(cmp, v, needle))
            }
        }
    }

    pub fn matches_group(&self, record: &Record, group: &FilterGroup) -> bool {
        if group.rules.is_empty() {
            return true;
        }
        match group.mode {
            MatchMode::All => group.rules.iter().all(|r| self.matches(record, r)),
            MatchMode::Any => group.rules.iter().any(|r| self.matches(record, r)),
        }
    }

    fn comparison(&self, field: &str) -> Comparison {
        self.columns
            .and_then(|c| c.get(field))
            .map(|d| d.field_type.comparison())
            .unwrap_or(Comparison::CaseInsensitive)
    }

    /// Non-blank text values of a field; one per item for list-valued fields.
    fn candidates(&self, record: &Record, field: &str) -> Vec<String> {
        let formula_columns = self
            .columns
            .filter(|c| c.get(field).is_some_and(|d| d.field_type.expression().is_some()));
        let texts = match formula_columns {
            Some(columns) => match FormulaEvaluator::new(columns).evaluate_field(field, record) {
                FormulaValue::Empty => Vec::new(),
                value => vec![value.to_string()],
            },
            None => lookup(record, field).map(value_texts).unwrap_or_default(),
        };
        texts.into_iter().filter(|t| !t.trim().is_empty()).collect()
    }
}

fn equal(cmp: Comparison, value: &str, needle: &str) -> bool {
    let value = value.trim();
    match cmp {
        Comparison::Exact => value == needle,
        Comparison::CaseInsensitive => value.to_lowercase() == needle.to_lowercase(),
        Comparison::Date => match (parse_date(value), parse_date(needle)) {
            (Some(a), Some(b)) => a == b,
            _ => value.to_lowercase() == needle.to_lowercase(),
        },
    }
}
