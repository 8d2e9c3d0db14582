//! Column registry: the source-of-truth map of field definitions for one entity.

use crate::config::types::{FieldDefinition, FieldUpdate, NewField, PinnedEdge};
use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ColumnRegistry {
    fields: BTreeMap<String, FieldDefinition>,
}

/// The map key is the field id; a disagreeing `id` inside the definition is overwritten.
impl<'de> Deserialize<'de> for ColumnRegistry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = BTreeMap::<String, FieldDefinition>::deserialize(deserializer)?;
        for (key, def) in fields.iter_mut() {
            if def.id != *key {
                def.id.clone_from(key);
            }
        }
        Ok(ColumnRegistry { fields })
    }
}

impl ColumnRegistry {
    pub fn new() -> Self {
        ColumnRegistry::default()
    }

    pub fn get(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fields.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Definitions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    /// Definitions by `order`, ties broken by id.
    pub fn ordered(&self) -> Vec<&FieldDefinition> {
        let mut defs: Vec<&FieldDefinition> = self.fields.values().collect();
        defs.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        defs
    }

    /// List-table columns: visible fields, leading-pinned first, trailing-pinned last.
    pub fn table_columns(&self) -> Vec<&FieldDefinition> {
        let edge_rank = |edge: PinnedEdge| match edge {
            PinnedEdge::Leading => 0,
            PinnedEdge::None => 1,
            PinnedEdge::Trailing => 2,
        };
        let mut defs: Vec<&FieldDefinition> = self.ordered().into_iter().filter(|d| d.visible).collect();
        defs.sort_by_key(|d| edge_rank(d.pinned));
        defs
    }

    fn next_order(&self) -> i64 {
        self.fields.values().map(|d| d.order).max().map(|m| m + 1).unwrap_or(0)
    }

    /// Add a field. Generates an id when none is given and appends it after the highest `order`.
    pub fn add_field(&mut self, new: NewField) -> Result<String, ConfigError> {
        let id = match new.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => format!("field_{}", uuid::Uuid::new_v4().simple()),
        };
        if self.fields.contains_key(&id) {
            return Err(ConfigError::DuplicateId { kind: "field", id });
        }
        if let Some(target) = new.merge_target.as_deref() {
            if !self.fields.contains_key(target) {
                return Err(ConfigError::unknown_field(target));
            }
        }
        let order = new.order.unwrap_or_else(|| self.next_order());
        let def = FieldDefinition {
            id: id.clone(),
            label: new.label,
            field_type: new.field_type,
            is_mandatory: new.is_mandatory,
            order,
            pinned: new.pinned,
            visible: new.visible || new.is_mandatory,
            merge_target: new.merge_target,
            style: new.style,
        };
        tracing::debug!(field_id = %id, order, "field added");
        self.fields.insert(id.clone(), def);
        Ok(id)
    }

    /// Merge a partial update into an existing field. Nothing changes when the update is rejected.
    pub fn update_field(&mut self, id: &str, update: FieldUpdate) -> Result<(), ConfigError> {
        let current = self.fields.get(id).ok_or_else(|| ConfigError::unknown_field(id))?;
        if current.is_mandatory && update.visible == Some(false) {
            return Err(ConfigError::MandatoryField {
                id: id.to_string(),
                action: "hidden",
            });
        }
        if let Some(Some(target)) = &update.merge_target {
            if target == id || !self.fields.contains_key(target) {
                return Err(ConfigError::unknown_field(target));
            }
        }

        let mut def = current.clone();
        if let Some(label) = update.label.clone() {
            def.label = label;
        }
        if let Some(kind) = update.kind {
            if kind != def.field_type.kind() {
                tracing::debug!(field_id = %id, from = ?def.field_type.kind(), to = ?kind, "field retyped");
            }
            def.field_type = def.field_type.retyped(kind);
        }
        let dropped = def.field_type.apply_attributes(&update);
        if !dropped.is_empty() {
            tracing::warn!(field_id = %id, ?dropped, "attributes not valid for field type were dropped");
        }
        if let Some(visible) = update.visible {
            def.visible = visible;
        }
        if let Some(pinned) = update.pinned {
            def.pinned = pinned;
        }
        if let Some(order) = update.order {
            def.order = order;
        }
        if let Some(target) = update.merge_target {
            def.merge_target = target;
        }
        if let Some(style) = update.style {
            def.style = style;
        }
        self.fields.insert(id.to_string(), def);
        Ok(())
    }

    /// Remove a field. Merge targets pointing at it are cleared; layouts must be resynced by the caller.
    pub fn remove_field(&mut self, id: &str) -> Result<FieldDefinition, ConfigError> {
        let def = self.fields.get(id).ok_or_else(|| ConfigError::unknown_field(id))?;
        if def.is_mandatory {
            return Err(ConfigError::MandatoryField {
                id: id.to_string(),
                action: "removed",
            });
        }
        let removed = self
            .fields
            .remove(id)
            .ok_or_else(|| ConfigError::unknown_field(id))?;
        for other in self.fields.values_mut() {
            if other.merge_target.as_deref() == Some(id) {
                other.merge_target = None;
            }
        }
        tracing::debug!(field_id = %id, "field removed");
        Ok(removed)
    }

    /// Reassign `order` so the listed ids come first, in the given sequence; unlisted
    /// fields follow in their previous relative order.
    pub fn reorder_fields(&mut self, ids: &[String]) -> Result<(), ConfigError> {
        if let Some(missing) = ids.iter().find(|id| !self.fields.contains_key(id.as_str())) {
            return Err(ConfigError::unknown_field(missing));
        }
        let position: HashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let rest: Vec<String> = self
            .ordered()
            .into_iter()
            .filter(|d| !position.contains_key(d.id.as_str()))
            .map(|d| d.id.clone())
            .collect();
        let mut seen = HashSet::new();
        for (order, id) in ids.iter().chain(rest.iter()).filter(|id| seen.insert(id.as_str())).enumerate() {
            if let Some(def) = self.fields.get_mut(id) {
                def.order = order as i64;
            }
        }
        Ok(())
    }
}

impl FromIterator<FieldDefinition> for ColumnRegistry {
    fn from_iter<I: IntoIterator<Item = FieldDefinition>>(iter: I) -> Self {
        ColumnRegistry {
            fields: iter.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{FieldKind, FieldType};

    fn registry() -> ColumnRegistry {
        let mut reg = ColumnRegistry::new();
        reg.add_field(NewField::new("Name", FieldType::Text).with_id("name").mandatory())
            .unwrap();
        reg.add_field(
            NewField::new(
                "Industry",
                FieldType::Select {
                    options: vec!["Tech".into(), "Finance".into()],
                    multiple: false,
                },
            )
            .with_id("industry"),
        )
        .unwrap();
        reg
    }

    #[test]
    fn add_assigns_next_order_and_generates_ids() {
        let mut reg = registry();
        let id = reg.add_field(NewField::new("Website", FieldType::Url)).unwrap();
        assert!(id.starts_with("field_"));
        assert_eq!(reg.get(&id).unwrap().order, 2);
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let mut reg = registry();
        let err = reg
            .add_field(NewField::new("Other", FieldType::Text).with_id("name"))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateId {
                kind: "field",
                id: "name".into()
            }
        );
        assert_eq!(reg.get("name").unwrap().label, "Name");
    }

    #[test]
    fn update_unknown_field_is_a_no_op() {
        let mut reg = registry();
        let before = reg.clone();
        let err = reg.update_field("ghost", FieldUpdate::default()).unwrap_err();
        assert!(err.is_unknown_reference());
        assert_eq!(reg, before);
    }

    #[test]
    fn retype_drops_invalid_attributes() {
        let mut reg = registry();
        reg.update_field(
            "industry",
            FieldUpdate {
                kind: Some(FieldKind::Number),
                options: Some(vec!["ignored".into()]),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(reg.get("industry").unwrap().field_type, FieldType::Number);
    }

    #[test]
    fn mandatory_fields_cannot_be_removed_or_hidden() {
        let mut reg = registry();
        let before = reg.clone();
        assert!(matches!(
            reg.remove_field("name"),
            Err(ConfigError::MandatoryField { action: "removed", .. })
        ));
        let hide = FieldUpdate {
            visible: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            reg.update_field("name", hide),
            Err(ConfigError::MandatoryField { action: "hidden", .. })
        ));
        assert_eq!(reg, before);
    }

    #[test]
    fn removing_a_merge_target_clears_references() {
        let mut reg = registry();
        let logo = reg.add_field(NewField::new("Logo", FieldType::Image).with_id("logo")).unwrap();
        reg.update_field(
            "name",
            FieldUpdate {
                merge_target: Some(Some(logo.clone())),
                ..Default::default()
            },
        )
        .unwrap();
        reg.remove_field(&logo).unwrap();
        assert_eq!(reg.get("name").unwrap().merge_target, None);
    }

    #[test]
    fn reorder_puts_listed_ids_first() {
        let mut reg = registry();
        reg.add_field(NewField::new("Phone", FieldType::Phone { multiple: false }).with_id("phone"))
            .unwrap();
        reg.reorder_fields(&["phone".into(), "name".into()]).unwrap();
        let ids: Vec<&str> = reg.ordered().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["phone", "name", "industry"]);
        assert!(reg.reorder_fields(&["nope".into()]).is_err());

        reg.reorder_fields(&["industry".into(), "phone".into(), "industry".into()]).unwrap();
        let orders: Vec<(&str, i64)> = reg.ordered().iter().map(|d| (d.id.as_str(), d.order)).collect();
        assert_eq!(orders, vec![("industry", 0), ("phone", 1), ("name", 2)]);
    }

    #[test]
    fn map_key_wins_over_inner_id() {
        let reg: ColumnRegistry = serde_json::from_value(serde_json::json!({
            "industry": { "id": "sector", "label": "Industry", "type": "text" }
        }))
        .unwrap();
        assert_eq!(reg.get("industry").unwrap().id, "industry");
        assert!(!reg.contains("sector"));
    }

    #[test]
    fn table_columns_respect_pinning() {
        let mut reg = registry();
        reg.add_field(
            NewField::new("Select", FieldType::Badge)
                .with_id("select")
                .pinned(PinnedEdge::Leading)
                .with_order(99),
        )
        .unwrap();
        reg.update_field(
            "name",
            FieldUpdate {
                pinned: Some(PinnedEdge::Trailing),
                ..Default::default()
            },
        )
        .unwrap();
        let ids: Vec<&str> = reg.table_columns().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["select", "industry", "name"]);
    }
}
