//! Forward-only migration of persisted configuration records.
//!
//! Older records are recognized by shape: each step checks for the keys its era lacked and
//! fills them in from the best legacy data available. Legacy keys are left in place. A record
//! that is already current passes through untouched, so migrating twice is a no-op.

use crate::config::defaults::detail_layout_from_ids;
use crate::config::{
    default_actions, default_cards_layout, default_columns, default_detail_layout, default_themes,
    is_system_field, ColumnRegistry, CURRENT_SCHEMA_VERSION,
};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("persisted config is not a JSON object")]
    NotAnObject,
    #[error("migration step '{step}': {source}")]
    Step {
        step: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Inputs a step may need beyond the record itself.
#[derive(Clone, Debug)]
pub struct MigrationContext<'a> {
    pub entity_id: &'a str,
    pub page_size: u32,
}

type Root = Map<String, Value>;

/// One named migration: a shape check and the transformation it guards.
pub struct MigrationStep {
    pub name: &'static str,
    applies: fn(&Root) -> bool,
    apply: fn(&mut Root, &MigrationContext) -> Result<(), serde_json::Error>,
}

impl MigrationStep {
    pub fn applies(&self, root: &Root) -> bool {
        (self.applies)(root)
    }
}

/// Steps in the order they are applied.
pub const STEPS: &[MigrationStep] = &[
    MigrationStep {
        name: "seed_columns",
        applies: lacks_columns,
        apply: seed_columns,
    },
    MigrationStep {
        name: "backfill_column_defaults",
        applies: needs_column_backfill,
        apply: backfill_column_defaults,
    },
    MigrationStep {
        name: "seed_actions",
        applies: lacks_actions,
        apply: seed_actions,
    },
    MigrationStep {
        name: "split_action_visibility",
        applies: has_legacy_actions,
        apply: split_action_visibility,
    },
    MigrationStep {
        name: "split_form_layout",
        applies: lacks_form_layout,
        apply: split_form_layout,
    },
    MigrationStep {
        name: "seed_detail_layout",
        applies: lacks_detail_layout,
        apply: seed_detail_layout,
    },
    MigrationStep {
        name: "seed_cards_layout",
        applies: lacks_cards_layout,
        apply: seed_cards_layout,
    },
    MigrationStep {
        name: "split_theme_styles",
        applies: lacks_themes,
        apply: split_theme_styles,
    },
    MigrationStep {
        name: "seed_list_settings",
        applies: lacks_list_settings,
        apply: seed_list_settings,
    },
];

/// Bring `doc` up to the current shape in place. Returns the names of the steps applied.
pub fn migrate(doc: &mut Value, ctx: &MigrationContext) -> Result<Vec<&'static str>, MigrationError> {
    let root = doc.as_object_mut().ok_or(MigrationError::NotAnObject)?;
    let mut applied = Vec::new();
    for step in STEPS {
        if !step.applies(root) {
            continue;
        }
        (step.apply)(root, ctx).map_err(|source| MigrationError::Step {
            step: step.name,
            source,
        })?;
        info!(entity_id = %ctx.entity_id, step = step.name, "applied config migration step");
        applied.push(step.name);
    }

    match root.get("schemaVersion").and_then(Value::as_u64) {
        Some(v) if v == u64::from(CURRENT_SCHEMA_VERSION) => {}
        Some(v) if v > u64::from(CURRENT_SCHEMA_VERSION) => {
            warn!(entity_id = %ctx.entity_id, version = v, "config was written by a newer schema version");
        }
        _ => {
            root.insert("schemaVersion".into(), json!(CURRENT_SCHEMA_VERSION));
        }
    }
    Ok(applied)
}

fn entity_config(root: &Root) -> Option<&Root> {
    root.get("entityConfig").and_then(Value::as_object)
}

/// Set one key of `entityConfig`, creating the object when it is absent or malformed.
fn set_layout_key(root: &mut Root, key: &str, value: Value) {
    let mut ec = match root.remove("entityConfig") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    ec.insert(key.into(), value);
    root.insert("entityConfig".into(), Value::Object(ec));
}

fn lacks_layout_key(root: &Root, key: &str) -> bool {
    entity_config(root).map_or(true, |ec| !ec.contains_key(key))
}

fn lacks_form_layout(root: &Root) -> bool {
    lacks_layout_key(root, "formLayout")
}

fn lacks_detail_layout(root: &Root) -> bool {
    lacks_layout_key(root, "detailLayout")
}

fn lacks_cards_layout(root: &Root) -> bool {
    lacks_layout_key(root, "cardsLayout")
}

fn lacks_themes(root: &Root) -> bool {
    lacks_layout_key(root, "themes")
}

fn lacks_columns(root: &Root) -> bool {
    !root.get("columns").is_some_and(Value::is_object)
}

fn lacks_actions(root: &Root) -> bool {
    root.get("actions").map_or(true, Value::is_null)
}

fn has_legacy_actions(root: &Root) -> bool {
    legacy_actions(root).next().is_some()
}

fn lacks_list_settings(root: &Root) -> bool {
    !root.get("sort").is_some_and(Value::is_object)
        || !root
            .get("pagination")
            .and_then(|p| p.get("pageSize"))
            .is_some_and(Value::is_u64)
}

/// Older records kept columns as a list; anything else unusable is replaced by defaults.
fn seed_columns(root: &mut Root, _: &MigrationContext) -> Result<(), serde_json::Error> {
    let columns = match root.remove("columns") {
        Some(Value::Array(items)) => {
            let keyed: Map<String, Value> = items
                .into_iter()
                .filter_map(|item| {
                    let id = item.get("id")?.as_str()?.to_string();
                    Some((id, item))
                })
                .collect();
            Value::Object(keyed)
        }
        _ => serde_json::to_value(default_columns())?,
    };
    root.insert("columns".into(), columns);
    Ok(())
}

fn seed_actions(root: &mut Root, _: &MigrationContext) -> Result<(), serde_json::Error> {
    root.insert("actions".into(), serde_json::to_value(default_actions())?);
    Ok(())
}

fn seed_cards_layout(root: &mut Root, _: &MigrationContext) -> Result<(), serde_json::Error> {
    set_layout_key(root, "cardsLayout", serde_json::to_value(default_cards_layout())?);
    Ok(())
}

fn needs_column_backfill(root: &Root) -> bool {
    let Some(columns) = root.get("columns").and_then(Value::as_object) else {
        return false;
    };
    columns.iter().any(|(key, column)| match column.as_object() {
        None => true,
        Some(c) => {
            c.get("id").and_then(Value::as_str) != Some(key.as_str())
                || !c.get("type").is_some_and(Value::is_string)
                || !c.get("label").is_some_and(Value::is_string)
                || !c.contains_key("order")
                || c.get("pinned").is_some_and(Value::is_boolean)
        }
    })
}

fn backfill_column_defaults(root: &mut Root, ctx: &MigrationContext) -> Result<(), serde_json::Error> {
    let Some(columns) = root.get_mut("columns").and_then(Value::as_object_mut) else {
        return Ok(());
    };
    columns.retain(|key, column| {
        let keep = column.is_object();
        if !keep {
            warn!(entity_id = %ctx.entity_id, column = %key, "dropping malformed column entry");
        }
        keep
    });
    for (position, (key, column)) in columns.iter_mut().enumerate() {
        let Some(c) = column.as_object_mut() else {
            continue;
        };
        let id = c.get("id").and_then(Value::as_str).map(String::from);
        if id.as_deref() != Some(key.as_str()) {
            if let Some(id) = id {
                warn!(entity_id = %ctx.entity_id, column = %key, id = %id, "column id disagrees with its key; using the key");
            }
            c.insert("id".into(), json!(key));
        }
        if !c.get("type").is_some_and(Value::is_string) {
            c.insert("type".into(), json!("text"));
        }
        if !c.get("label").is_some_and(Value::is_string) {
            c.insert("label".into(), json!(key));
        }
        if !c.contains_key("order") {
            c.insert("order".into(), json!(position));
        }
        if let Some(pinned) = c.get("pinned").and_then(Value::as_bool) {
            c.insert("pinned".into(), json!(if pinned { "leading" } else { "none" }));
        }
    }
    Ok(())
}

fn legacy_actions(root: &Root) -> impl Iterator<Item = &Root> {
    root.get("actions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .filter(|a| !a.contains_key("tableDisplayMode"))
}

/// `hiddenInTable: true` meant "only in the overflow menu"; the card flag did not exist yet.
fn split_action_visibility(root: &mut Root, _: &MigrationContext) -> Result<(), serde_json::Error> {
    let Some(actions) = root.get_mut("actions").and_then(Value::as_array_mut) else {
        return Ok(());
    };
    for action in actions.iter_mut().filter_map(Value::as_object_mut) {
        if action.contains_key("tableDisplayMode") {
            continue;
        }
        let hidden = action.get("hiddenInTable").and_then(Value::as_bool).unwrap_or(false);
        action.insert(
            "tableDisplayMode".into(),
            json!(if hidden { "menu" } else { "primary" }),
        );
        action.entry("cardVisible").or_insert(json!(true));
    }
    Ok(())
}

/// Field id of one entry of the legacy `layout` list (a bare id or an item object).
fn legacy_item_id(item: &Value) -> Option<&str> {
    match item {
        Value::String(id) => Some(id),
        Value::Object(obj) => obj
            .get("id")
            .or_else(|| obj.get("field"))
            .and_then(Value::as_str),
        _ => None,
    }
}

fn legacy_layout(root: &Root) -> &[Value] {
    entity_config(root)
        .and_then(|ec| ec.get("layout"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn split_form_layout(root: &mut Root, _: &MigrationContext) -> Result<(), serde_json::Error> {
    let items: Vec<Value> = legacy_layout(root)
        .iter()
        .filter_map(|item| {
            let id = legacy_item_id(item)?;
            let mut converted = item.as_object().cloned().unwrap_or_default();
            // Cached type data is rebuilt from the columns by the next sync pass.
            for key in ["field", "type", "dropdownOptions", "isMultiSelect"] {
                converted.remove(key);
            }
            converted.insert("id".into(), json!(id));
            Some(Value::Object(converted))
        })
        .collect();
    set_layout_key(root, "formLayout", Value::Array(items));
    Ok(())
}

/// Visible entries of the legacy layout fill the detail zones; without one, columns do.
fn seed_detail_layout(root: &mut Root, _: &MigrationContext) -> Result<(), serde_json::Error> {
    let legacy_ids: Vec<String> = legacy_layout(root)
        .iter()
        .filter(|item| item.get("visible").and_then(Value::as_bool) != Some(false))
        .filter_map(legacy_item_id)
        .filter(|id| !is_system_field(id))
        .map(String::from)
        .collect();
    let layout = if legacy_ids.is_empty() {
        let columns: ColumnRegistry = root
            .get("columns")
            .cloned()
            .and_then(|c| serde_json::from_value(c).ok())
            .unwrap_or_default();
        default_detail_layout(&columns)
    } else {
        detail_layout_from_ids(legacy_ids)
    };
    set_layout_key(root, "detailLayout", serde_json::to_value(layout)?);
    Ok(())
}

/// A single legacy style set becomes both the light and the dark theme.
fn split_theme_styles(root: &mut Root, _: &MigrationContext) -> Result<(), serde_json::Error> {
    let legacy = entity_config(root)
        .and_then(|ec| ec.get("styles"))
        .filter(|s| s.is_object())
        .cloned();
    let themes = match legacy {
        Some(styles) => json!({ "light": styles.clone(), "dark": styles }),
        None => serde_json::to_value(default_themes())?,
    };
    set_layout_key(root, "themes", themes);
    Ok(())
}

fn seed_list_settings(root: &mut Root, ctx: &MigrationContext) -> Result<(), serde_json::Error> {
    if !root.get("sort").is_some_and(Value::is_object) {
        let has_name = root
            .get("columns")
            .and_then(Value::as_object)
            .is_some_and(|c| c.contains_key("name"));
        let sort = if has_name {
            json!({ "field": "name", "direction": "asc" })
        } else {
            json!({ "direction": "asc" })
        };
        root.insert("sort".into(), sort);
    }
    let pagination = root
        .entry("pagination")
        .or_insert_with(|| Value::Object(Map::new()));
    if !pagination.is_object() {
        *pagination = Value::Object(Map::new());
    }
    if let Some(p) = pagination.as_object_mut() {
        if !p.get("pageSize").is_some_and(Value::is_u64) {
            p.insert("pageSize".into(), json!(ctx.page_size));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_configuration, AggregateConfiguration, TableDisplayMode};

    fn ctx() -> MigrationContext<'static> {
        MigrationContext {
            entity_id: "company",
            page_size: 25,
        }
    }

    #[test]
    fn current_record_is_untouched() {
        let config = default_configuration("company", 25);
        let mut doc = serde_json::to_value(&config).unwrap();
        let before = serde_json::to_vec(&doc).unwrap();
        let applied = migrate(&mut doc, &ctx()).unwrap();
        assert!(applied.is_empty());
        assert_eq!(serde_json::to_vec(&doc).unwrap(), before);
    }

    #[test]
    fn empty_record_is_seeded_completely() {
        let mut doc = json!({});
        let applied = migrate(&mut doc, &ctx()).unwrap();
        assert_eq!(applied.len(), STEPS.len() - 2, "{:?}", applied);
        assert!(!applied.contains(&"backfill_column_defaults"));
        assert!(!applied.contains(&"split_action_visibility"));
        let config: AggregateConfiguration = serde_json::from_value(doc).unwrap();
        assert_eq!(config.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(config.actions.len(), 3);
        assert_eq!(config.pagination.page_size, 25);
    }

    #[test]
    fn hidden_in_table_becomes_menu() {
        let mut doc = json!({
            "actions": [
                { "id": "view", "label": "View", "hiddenInTable": false },
                { "id": "archive", "label": "Archive", "kind": "custom", "urlTemplate": "/a/{id}", "hiddenInTable": true }
            ]
        });
        let applied = migrate(&mut doc, &ctx()).unwrap();
        assert!(applied.contains(&"split_action_visibility"));
        assert!(!applied.contains(&"seed_actions"));
        let config: AggregateConfiguration = serde_json::from_value(doc).unwrap();
        let archive = config.actions.get("archive").unwrap();
        assert_eq!(archive.table_display_mode, TableDisplayMode::Menu);
        assert!(archive.card_visible);
        assert_eq!(archive.legacy.get("hiddenInTable"), Some(&json!(true)));
        assert_eq!(config.actions.get("view").unwrap().table_display_mode, TableDisplayMode::Primary);
    }

    #[test]
    fn legacy_layout_and_styles_are_split() {
        let mut doc = json!({
            "columns": {
                "name": { "label": "Name", "isMandatory": true, "pinned": true },
                "industry": { "id": "industry", "label": "Industry", "type": "text", "order": 2 }
            },
            "entityConfig": {
                "layout": ["name", { "id": "industry", "visible": false, "width": "half" }],
                "styles": { "header": { "background": "#eee" } }
            }
        });
        migrate(&mut doc, &ctx()).unwrap();
        let ec = &doc["entityConfig"];
        assert_eq!(ec["formLayout"][1]["width"], json!("half"));
        assert_eq!(ec["detailLayout"]["top"], json!(["name"]));
        assert_eq!(ec["detailLayout"]["left"], json!([]));
        assert_eq!(ec["themes"]["light"], ec["themes"]["dark"]);
        assert_eq!(ec["themes"]["dark"]["header"]["background"], json!("#eee"));
        assert!(ec.get("layout").is_some() && ec.get("styles").is_some());
        assert_eq!(doc["columns"]["name"]["pinned"], json!("leading"));
        assert_eq!(doc["columns"]["name"]["type"], json!("text"));
        assert_eq!(doc["sort"]["field"], json!("name"));
    }

    #[test]
    fn migration_is_idempotent_on_legacy_input() {
        let mut doc = json!({
            "columns": [{ "id": "name", "label": "Name" }],
            "entityConfig": { "layout": ["name"] }
        });
        migrate(&mut doc, &ctx()).unwrap();
        let once = serde_json::to_vec(&doc).unwrap();
        assert!(migrate(&mut doc, &ctx()).unwrap().is_empty());
        assert_eq!(serde_json::to_vec(&doc).unwrap(), once);
    }

    #[test]
    fn column_id_follows_its_key() {
        let mut doc = json!({
            "columns": {
                "industry": { "id": "sector", "label": "Industry", "type": "text", "order": 0 }
            }
        });
        let applied = migrate(&mut doc, &ctx()).unwrap();
        assert!(applied.contains(&"backfill_column_defaults"));
        assert_eq!(doc["columns"]["industry"]["id"], json!("industry"));

        let mut config: AggregateConfiguration = serde_json::from_value(doc).unwrap();
        crate::config::synchronize(&mut config);
        assert!(crate::config::synchronize(&mut config).is_noop());
        crate::config::validate(&config).unwrap();
    }

    #[test]
    fn legacy_layout_type_cache_is_not_carried_over() {
        let mut doc = json!({
            "columns": {
                "rating": { "id": "rating", "label": "Rating", "type": "stars", "order": 0 }
            },
            "entityConfig": {
                "layout": [{ "id": "rating", "type": "stars", "dropdownOptions": "1-5", "required": true }]
            }
        });
        migrate(&mut doc, &ctx()).unwrap();
        let item = &doc["entityConfig"]["formLayout"][0];
        assert!(item.get("type").is_none() && item.get("dropdownOptions").is_none());
        assert_eq!(item["required"], json!(true));
        let config: AggregateConfiguration = serde_json::from_value(doc).unwrap();
        assert!(config.columns.contains("rating"));
    }

    #[test]
    fn non_object_is_rejected() {
        let mut doc = json!([1, 2, 3]);
        assert!(matches!(migrate(&mut doc, &ctx()), Err(MigrationError::NotAnObject)));
    }
}
