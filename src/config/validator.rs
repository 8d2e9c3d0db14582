//! Config validation: referential integrity of layouts, actions and formulas.

use crate::config::actions::ActionKind;
use crate::config::types::{is_system_field, AggregateConfiguration, DetailZone};
use crate::error::ConfigError;
use crate::eval::Formula;
use std::collections::HashSet;

pub fn validate(config: &AggregateConfiguration) -> Result<(), ConfigError> {
    for def in config.columns.iter() {
        if let Some(target) = def.merge_target.as_deref() {
            if !config.columns.contains(target) {
                return Err(ConfigError::MissingReference {
                    kind: "merge target",
                    id: target.to_string(),
                });
            }
        }
    }

    let mut form_ids = HashSet::new();
    for item in &config.layout.form_layout {
        if !config.columns.contains(&item.id) || is_system_field(&item.id) {
            return Err(ConfigError::MissingReference {
                kind: "form layout",
                id: item.id.clone(),
            });
        }
        if !form_ids.insert(item.id.as_str()) {
            return Err(ConfigError::Validation(format!("form layout lists '{}' twice", item.id)));
        }
    }
    for def in config.columns.iter().filter(|d| !d.is_system()) {
        if !form_ids.contains(def.id.as_str()) {
            return Err(ConfigError::Validation(format!("field '{}' has no form layout item", def.id)));
        }
    }

    let mut placed = HashSet::new();
    for zone in DetailZone::ALL {
        for id in config.layout.detail_layout.zone(zone) {
            if !config.columns.contains(id) || is_system_field(id) {
                return Err(ConfigError::MissingReference {
                    kind: "detail layout",
                    id: id.clone(),
                });
            }
            if !placed.insert(id.as_str()) {
                return Err(ConfigError::Validation(format!("detail layout places '{}' twice", id)));
            }
        }
    }

    let mut action_ids = HashSet::new();
    for action in config.actions.iter() {
        if !action_ids.insert(action.id.as_str()) {
            return Err(ConfigError::DuplicateId {
                kind: "action",
                id: action.id.clone(),
            });
        }
        let has_template = action.url_template.as_deref().map(|t| !t.trim().is_empty()).unwrap_or(false);
        if action.kind == ActionKind::Custom && !has_template {
            return Err(ConfigError::Validation(format!(
                "custom action '{}' requires a url template",
                action.id
            )));
        }
    }

    Ok(())
}

/// `(formula field, referenced id)` pairs whose reference resolves to no field. These
/// evaluate as empty, so they are reported rather than rejected.
pub fn dangling_formula_references(config: &AggregateConfiguration) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for def in config.columns.iter() {
        let Some(expression) = def.field_type.expression() else {
            continue;
        };
        let Ok(formula) = Formula::parse(expression) else {
            continue;
        };
        for reference in formula.references() {
            if !config.columns.contains(reference) {
                out.push((def.id.clone(), reference.to_string()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_configuration;
    use crate::config::types::{FieldType, FormLayoutItem, NewField};

    #[test]
    fn orphaned_form_item_is_reported() {
        let mut config = default_configuration("company", 25);
        config.layout.form_layout.push(FormLayoutItem::new("ghost"));
        assert_eq!(
            validate(&config).unwrap_err(),
            ConfigError::MissingReference {
                kind: "form layout",
                id: "ghost".into()
            }
        );
    }

    #[test]
    fn detail_zone_duplicates_are_reported() {
        let mut config = default_configuration("company", 25);
        config.layout.detail_layout.right.push("name".into());
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn dangling_formula_references_are_listed() {
        let mut config = default_configuration("company", 25);
        config
            .columns
            .add_field(
                NewField::new(
                    "Score",
                    FieldType::Formula {
                        expression: "{revenue} / {employees}".into(),
                    },
                )
                .with_id("score"),
            )
            .unwrap();
        let dangling = dangling_formula_references(&config);
        assert_eq!(
            dangling,
            vec![
                ("score".to_string(), "revenue".to_string()),
                ("score".to_string(), "employees".to_string())
            ]
        );
    }
}
