//! Synthesized defaults for entities with no persisted configuration.

use crate::config::actions::{ActionDefinition, ActionRegistry, ActionVariant};
use crate::config::layout::synchronize;
use crate::config::registry::ColumnRegistry;
use crate::config::types::*;

fn column(id: &str, label: &str, field_type: FieldType, order: i64) -> FieldDefinition {
    FieldDefinition {
        id: id.to_string(),
        label: label.to_string(),
        field_type,
        is_mandatory: false,
        order,
        pinned: PinnedEdge::None,
        visible: true,
        merge_target: None,
        style: ColumnStyle::default(),
    }
}

fn system(mut def: FieldDefinition, pinned: PinnedEdge) -> FieldDefinition {
    def.is_mandatory = true;
    def.pinned = pinned;
    def
}

pub fn default_columns() -> ColumnRegistry {
    let mut name = column("name", "Name", FieldType::Text, 1);
    name.is_mandatory = true;
    name.pinned = PinnedEdge::Leading;
    [
        system(column("select", "", FieldType::Badge, 0), PinnedEdge::Leading),
        name,
        column("email", "Email", FieldType::Email { multiple: true }, 2),
        column("phone", "Phone", FieldType::Phone { multiple: false }, 3),
        column(
            "status",
            "Status",
            FieldType::Select {
                options: vec!["Active".into(), "Inactive".into()],
                multiple: false,
            },
            4,
        ),
        column("website", "Website", FieldType::Url, 5),
        system(column("createdAt", "Created", FieldType::Date, 6), PinnedEdge::None),
        system(column("updatedAt", "Updated", FieldType::Date, 7), PinnedEdge::None),
        system(column("actions", "", FieldType::Text, 8), PinnedEdge::Trailing),
    ]
    .into_iter()
    .collect()
}

/// The built-in view/edit/delete actions.
pub fn default_actions() -> ActionRegistry {
    let mut delete = ActionDefinition::system("delete", "Delete", "trash");
    delete.variant = ActionVariant::Destructive;
    ActionRegistry::new(vec![
        ActionDefinition::system("view", "View", "eye"),
        ActionDefinition::system("edit", "Edit", "pencil"),
        delete,
    ])
}

/// First ordered field on top, the rest alternating between the two columns.
pub fn default_detail_layout(columns: &ColumnRegistry) -> DetailLayout {
    detail_layout_from_ids(
        columns
            .ordered()
            .into_iter()
            .filter(|d| !d.is_system())
            .map(|d| d.id.clone()),
    )
}

pub(crate) fn detail_layout_from_ids(ids: impl IntoIterator<Item = String>) -> DetailLayout {
    let mut layout = DetailLayout::default();
    let mut rest = ids.into_iter();
    if let Some(first) = rest.next() {
        layout.top.push(first);
    }
    for (i, id) in rest.enumerate() {
        if i % 2 == 0 {
            layout.left.push(id);
        } else {
            layout.right.push(id);
        }
    }
    layout
}

pub fn default_cards_layout() -> Vec<String> {
    ["details", "activity", "notes", "attachments"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn default_zone_styles() -> ZoneStyles {
    ZoneStyles {
        header: StyleBlock {
            font_weight: Some("600".into()),
            ..Default::default()
        },
        row: StyleBlock::default(),
        card: StyleBlock::default(),
    }
}

pub fn default_themes() -> ThemeStyles {
    let mut dark = default_zone_styles();
    dark.header.background = Some("#1f2937".into());
    dark.header.text_color = Some("#f9fafb".into());
    let mut light = default_zone_styles();
    light.header.background = Some("#f9fafb".into());
    light.header.text_color = Some("#111827".into());
    ThemeStyles { light, dark }
}

/// A complete, synchronized configuration for an entity that has never been saved.
pub fn default_configuration(entity_id: &str, page_size: u32) -> AggregateConfiguration {
    let columns = default_columns();
    let detail_layout = default_detail_layout(&columns);
    let mut config = AggregateConfiguration {
        schema_version: CURRENT_SCHEMA_VERSION,
        entity_id: entity_id.to_string(),
        columns,
        actions: default_actions(),
        layout: EntityLayout {
            form_layout: Vec::new(),
            detail_layout,
            cards_layout: default_cards_layout(),
            themes: default_themes(),
            legacy: Default::default(),
        },
        sort: SortSpec {
            field: Some("name".into()),
            direction: SortDirection::Asc,
        },
        pagination: Pagination { page_size },
    };
    synchronize(&mut config);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validate;

    #[test]
    fn defaults_are_consistent() {
        let config = default_configuration("company", 25);
        validate(&config).unwrap();
        assert_eq!(config.layout.detail_layout.top, vec!["name"]);
        assert!(config.layout.form_layout.iter().all(|i| !is_system_field(&i.id)));
        assert_eq!(config.actions.len(), 3);
    }

    #[test]
    fn system_columns_are_mandatory() {
        let columns = default_columns();
        for id in SYSTEM_FIELD_IDS {
            assert!(columns.get(id).unwrap().is_mandatory, "{} should be mandatory", id);
        }
    }
}
