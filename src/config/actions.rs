//! Action buttons: list-row placement and detail-card visibility, each set independently.

use crate::config::types::default_true;
use crate::error::ConfigError;
use crate::eval::{lookup, value_texts, Record};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Built-in (view, edit, delete); seeded once and never removed.
    #[default]
    System,
    /// User-defined link built from a URL template.
    Custom,
}

/// Placement of an action in a list-table row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableDisplayMode {
    #[default]
    Primary,
    Menu,
    Hidden,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionVariant {
    #[default]
    Default,
    Outline,
    Ghost,
    Destructive,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub kind: ActionKind,
    /// `{fieldId}` placeholders are replaced by the record's values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_template: Option<String>,
    #[serde(default)]
    pub table_display_mode: TableDisplayMode,
    #[serde(default = "default_true")]
    pub card_visible: bool,
    #[serde(default)]
    pub variant: ActionVariant,
    /// Keys from older record shapes (e.g. `hiddenInTable`).
    #[serde(flatten)]
    pub legacy: Map<String, Value>,
}

impl ActionDefinition {
    pub fn system(id: &str, label: &str, icon: &str) -> Self {
        ActionDefinition {
            id: id.to_string(),
            label: label.to_string(),
            icon: icon.to_string(),
            kind: ActionKind::System,
            url_template: None,
            table_display_mode: TableDisplayMode::Primary,
            card_visible: true,
            variant: ActionVariant::Default,
            legacy: Map::new(),
        }
    }

    pub fn custom(label: &str, icon: &str, url_template: &str) -> Self {
        ActionDefinition {
            id: String::new(),
            kind: ActionKind::Custom,
            url_template: Some(url_template.to_string()),
            ..ActionDefinition::system("", label, icon)
        }
    }

    pub fn is_system(&self) -> bool {
        self.kind == ActionKind::System
    }

    /// Build the link for a custom action. Placeholders of missing fields become empty.
    pub fn render_url(&self, record: &Record) -> Option<String> {
        let template = self.url_template.as_deref()?;
        let rendered = placeholder_pattern().replace_all(template, |caps: &regex::Captures| {
            let value = lookup(record, &caps[1])
                .map(|v| value_texts(v).join(","))
                .unwrap_or_default();
            urlencoding::encode(&value).into_owned()
        });
        Some(rendered.into_owned())
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\s*([A-Za-z0-9_.\-]+)\s*\}").expect("valid placeholder pattern"))
}

/// Partial update for `update_action`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionUpdate {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub url_template: Option<String>,
    #[serde(default)]
    pub table_display_mode: Option<TableDisplayMode>,
    #[serde(default)]
    pub card_visible: Option<bool>,
    #[serde(default)]
    pub variant: Option<ActionVariant>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionRegistry {
    actions: Vec<ActionDefinition>,
}

impl ActionRegistry {
    pub fn new(actions: Vec<ActionDefinition>) -> Self {
        ActionRegistry { actions }
    }

    pub fn get(&self, id: &str) -> Option<&ActionDefinition> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionDefinition> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions rendered as buttons in each table row.
    pub fn table_primary(&self) -> Vec<&ActionDefinition> {
        self.with_mode(TableDisplayMode::Primary)
    }

    /// Actions collapsed into the row's overflow menu.
    pub fn table_menu(&self) -> Vec<&ActionDefinition> {
        self.with_mode(TableDisplayMode::Menu)
    }

    pub fn card_actions(&self) -> Vec<&ActionDefinition> {
        self.actions.iter().filter(|a| a.card_visible).collect()
    }

    fn with_mode(&self, mode: TableDisplayMode) -> Vec<&ActionDefinition> {
        self.actions.iter().filter(|a| a.table_display_mode == mode).collect()
    }

    pub fn add_action(&mut self, mut action: ActionDefinition) -> Result<String, ConfigError> {
        if action.id.trim().is_empty() {
            action.id = format!("action_{}", uuid::Uuid::new_v4().simple());
        }
        if self.get(&action.id).is_some() {
            return Err(ConfigError::DuplicateId {
                kind: "action",
                id: action.id,
            });
        }
        check_template(&action.id, action.kind, action.url_template.as_deref())?;
        let id = action.id.clone();
        tracing::debug!(action_id = %id, kind = ?action.kind, "action added");
        self.actions.push(action);
        Ok(id)
    }

    pub fn update_action(&mut self, id: &str, update: ActionUpdate) -> Result<(), ConfigError> {
        let action = self
            .actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ConfigError::unknown_action(id))?;
        if update.url_template.is_some() || action.kind == ActionKind::Custom {
            let template = update.url_template.as_deref().or(action.url_template.as_deref());
            check_template(id, action.kind, template)?;
        }
        if let Some(label) = update.label {
            action.label = label;
        }
        if let Some(icon) = update.icon {
            action.icon = icon;
        }
        if let Some(template) = update.url_template {
            action.url_template = Some(template);
        }
        if let Some(mode) = update.table_display_mode {
            action.table_display_mode = mode;
        }
        if let Some(visible) = update.card_visible {
            action.card_visible = visible;
        }
        if let Some(variant) = update.variant {
            action.variant = variant;
        }
        Ok(())
    }

    /// Remove a custom action. System actions can only be hidden.
    pub fn remove_action(&mut self, id: &str) -> Result<ActionDefinition, ConfigError> {
        let idx = self
            .actions
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| ConfigError::unknown_action(id))?;
        if self.actions[idx].is_system() {
            return Err(ConfigError::SystemAction(id.to_string()));
        }
        tracing::debug!(action_id = %id, "action removed");
        Ok(self.actions.remove(idx))
    }

    /// Listed ids first in the given sequence, the rest after in their previous order.
    pub fn reorder_actions(&mut self, ids: &[String]) -> Result<(), ConfigError> {
        if let Some(missing) = ids.iter().find(|id| self.get(id).is_none()) {
            return Err(ConfigError::unknown_action(missing));
        }
        let rank = |a: &ActionDefinition| ids.iter().position(|id| *id == a.id).unwrap_or(ids.len());
        self.actions.sort_by_key(|a| rank(a));
        Ok(())
    }
}

fn check_template(id: &str, kind: ActionKind, template: Option<&str>) -> Result<(), ConfigError> {
    match (kind, template.map(str::trim)) {
        (ActionKind::Custom, None) | (ActionKind::Custom, Some("")) => Err(ConfigError::Validation(format!(
            "custom action '{}' requires a url template",
            id
        ))),
        (ActionKind::System, Some(_)) => Err(ConfigError::Validation(format!(
            "system action '{}' cannot carry a url template",
            id
        ))),
        _ => Ok(()),
    }
}
