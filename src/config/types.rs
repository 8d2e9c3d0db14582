//! Config types matching the persisted JSON record (camelCase keys).

use crate::config::actions::ActionRegistry;
use crate::config::registry::ColumnRegistry;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Field ids owned by the list table itself (selection checkbox, action column, audit metadata).
/// They live in the column registry so the table can place them, but never appear in form or detail layouts.
pub const SYSTEM_FIELD_IDS: &[&str] = &["select", "actions", "createdAt", "updatedAt"];

pub fn is_system_field(id: &str) -> bool {
    SYSTEM_FIELD_IDS.contains(&id)
}

/// Current shape of the persisted record. Bumped whenever a migration step is added.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

pub const DEFAULT_PAGE_SIZE: u32 = 25;

pub(crate) fn default_true() -> bool {
    true
}

/// The type of a field, with the attributes only that type carries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldType {
    Number,
    Badge,
    Date,
    Phone {
        #[serde(default)]
        multiple: bool,
    },
    Email {
        #[serde(default)]
        multiple: bool,
    },
    Address,
    Select {
        #[serde(default)]
        options: Vec<String>,
        #[serde(default)]
        multiple: bool,
    },
    Currency {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        currency: Option<String>,
    },
    Url,
    File,
    Image,
    Identifier {
        #[serde(default)]
        prefix: String,
    },
    Formula {
        #[serde(default)]
        expression: String,
    },
    /// Unknown type names from older or foreign records degrade to plain text.
    #[default]
    #[serde(other)]
    Text,
}

/// Payload-free tag of a [`FieldType`]; what layout caches and update requests carry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Number,
    Badge,
    Date,
    Phone,
    Email,
    Address,
    Select,
    Currency,
    Url,
    File,
    Image,
    Identifier,
    Formula,
    /// Layout caches written by older clients may name kinds this build does not know.
    #[default]
    #[serde(other)]
    Text,
}

/// How `equals`/`is` filter rules compare values of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// Typed user input: case-insensitive, surrounding whitespace ignored.
    CaseInsensitive,
    /// Values picked from a fixed option list: exact match.
    Exact,
    /// Calendar dates; `2024-03-01` equals `2024-03-01T10:00:00Z`.
    Date,
}

impl FieldType {
    /// Default payload for a kind.
    pub fn from_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => FieldType::Text,
            FieldKind::Number => FieldType::Number,
            FieldKind::Badge => FieldType::Badge,
            FieldKind::Date => FieldType::Date,
            FieldKind::Phone => FieldType::Phone { multiple: false },
            FieldKind::Email => FieldType::Email { multiple: false },
            FieldKind::Address => FieldType::Address,
            FieldKind::Select => FieldType::Select {
                options: Vec::new(),
                multiple: false,
            },
            FieldKind::Currency => FieldType::Currency { currency: None },
            FieldKind::Url => FieldType::Url,
            FieldKind::File => FieldType::File,
            FieldKind::Image => FieldType::Image,
            FieldKind::Identifier => FieldType::Identifier {
                prefix: String::new(),
            },
            FieldKind::Formula => FieldType::Formula {
                expression: String::new(),
            },
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldType::Text => FieldKind::Text,
            FieldType::Number => FieldKind::Number,
            FieldType::Badge => FieldKind::Badge,
            FieldType::Date => FieldKind::Date,
            FieldType::Phone { .. } => FieldKind::Phone,
            FieldType::Email { .. } => FieldKind::Email,
            FieldType::Address => FieldKind::Address,
            FieldType::Select { .. } => FieldKind::Select,
            FieldType::Currency { .. } => FieldKind::Currency,
            FieldType::Url => FieldKind::Url,
            FieldType::File => FieldKind::File,
            FieldType::Image => FieldKind::Image,
            FieldType::Identifier { .. } => FieldKind::Identifier,
            FieldType::Formula { .. } => FieldKind::Formula,
        }
    }

    /// Dropdown options; empty for every type but select.
    pub fn options(&self) -> &[String] {
        match self {
            FieldType::Select { options, .. } => options,
            _ => &[],
        }
    }

    /// Whether a record holds a list of values for this field.
    pub fn is_multi_value(&self) -> bool {
        match self {
            FieldType::Select { multiple, .. }
            | FieldType::Email { multiple }
            | FieldType::Phone { multiple } => *multiple,
            _ => false,
        }
    }

    pub fn comparison(&self) -> Comparison {
        match self {
            FieldType::Select { .. } | FieldType::Badge => Comparison::Exact,
            FieldType::Date => Comparison::Date,
            _ => Comparison::CaseInsensitive,
        }
    }

    pub fn expression(&self) -> Option<&str> {
        match self {
            FieldType::Formula { expression } => Some(expression),
            _ => None,
        }
    }

    /// Convert to another kind, keeping only the attributes the new kind understands.
    pub fn retyped(self, kind: FieldKind) -> Self {
        if self.kind() == kind {
            return self;
        }
        let multiple = self.is_multi_value();
        match kind {
            FieldKind::Select => FieldType::Select {
                options: Vec::new(),
                multiple,
            },
            FieldKind::Email => FieldType::Email { multiple },
            FieldKind::Phone => FieldType::Phone { multiple },
            other => FieldType::from_kind(other),
        }
    }

    /// Apply the type-specific attributes of an update. Returns the names of attributes
    /// the current type does not carry; those are dropped.
    pub(crate) fn apply_attributes(&mut self, update: &FieldUpdate) -> Vec<&'static str> {
        let mut dropped = Vec::new();
        if let Some(new_options) = &update.options {
            match self {
                FieldType::Select { options, .. } => *options = new_options.clone(),
                _ => dropped.push("options"),
            }
        }
        if let Some(flag) = update.multiple {
            match self {
                FieldType::Select { multiple, .. }
                | FieldType::Email { multiple }
                | FieldType::Phone { multiple } => *multiple = flag,
                _ => dropped.push("multiple"),
            }
        }
        if let Some(new_prefix) = &update.prefix {
            match self {
                FieldType::Identifier { prefix } => *prefix = new_prefix.clone(),
                _ => dropped.push("prefix"),
            }
        }
        if let Some(new_expression) = &update.expression {
            match self {
                FieldType::Formula { expression } => *expression = new_expression.clone(),
                _ => dropped.push("expression"),
            }
        }
        if let Some(code) = &update.currency {
            match self {
                FieldType::Currency { currency } => *currency = Some(code.clone()),
                _ => dropped.push("currency"),
            }
        }
        dropped
    }
}

/// Which table edge a column sticks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinnedEdge {
    #[default]
    None,
    #[serde(alias = "left")]
    Leading,
    #[serde(alias = "right")]
    Trailing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Presentation attributes of one column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Alignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
}

impl ColumnStyle {
    pub fn is_empty(&self) -> bool {
        *self == ColumnStyle::default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub id: String,
    pub label: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub pinned: PinnedEdge,
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Column whose value renders merged into this one (e.g. a logo next to the name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_target: Option<String>,
    #[serde(default, skip_serializing_if = "ColumnStyle::is_empty")]
    pub style: ColumnStyle,
}

impl FieldDefinition {
    pub fn is_system(&self) -> bool {
        is_system_field(&self.id)
    }
}

/// Input for `add_field`. `id` and `order` are assigned by the registry when unset.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewField {
    #[serde(default)]
    pub id: Option<String>,
    pub label: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default)]
    pub pinned: PinnedEdge,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub merge_target: Option<String>,
    #[serde(default)]
    pub style: ColumnStyle,
}

impl NewField {
    pub fn new(label: impl Into<String>, field_type: FieldType) -> Self {
        NewField {
            label: label.into(),
            field_type,
            visible: true,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.is_mandatory = true;
        self
    }

    pub fn pinned(mut self, edge: PinnedEdge) -> Self {
        self.pinned = edge;
        self
    }
}

/// Partial update for `update_field`; absent attributes are left alone.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdate {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<FieldKind>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub multiple: Option<bool>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub pinned: Option<PinnedEdge>,
    #[serde(default)]
    pub order: Option<i64>,
    /// `Some(None)` clears the merge target; `None` leaves it.
    #[serde(default, deserialize_with = "double_option")]
    pub merge_target: Option<Option<String>>,
    #[serde(default)]
    pub style: Option<ColumnStyle>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormWidth {
    #[default]
    Full,
    Half,
}

/// One entry of the record-entry form. The type/options/multi fields are a cache of the
/// referenced field, refreshed only by the layout synchronizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormLayoutItem {
    pub id: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub width: FormWidth,
    #[serde(default, rename = "type")]
    pub(crate) field_type: FieldKind,
    #[serde(default)]
    pub(crate) dropdown_options: Vec<String>,
    #[serde(default)]
    pub(crate) is_multi_select: bool,
}

impl FormLayoutItem {
    /// A visible, optional item whose cache is filled on the next sync pass.
    pub fn new(id: impl Into<String>) -> Self {
        FormLayoutItem {
            id: id.into(),
            visible: true,
            required: false,
            width: FormWidth::Full,
            field_type: FieldKind::Text,
            dropdown_options: Vec::new(),
            is_multi_select: false,
        }
    }

    pub fn field_type(&self) -> FieldKind {
        self.field_type
    }

    pub fn dropdown_options(&self) -> &[String] {
        &self.dropdown_options
    }

    pub fn is_multi_select(&self) -> bool {
        self.is_multi_select
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailZone {
    Top,
    Left,
    Right,
}

impl DetailZone {
    pub const ALL: [DetailZone; 3] = [DetailZone::Top, DetailZone::Left, DetailZone::Right];
}

/// Detail card placement. Ids in no zone are hidden from the detail view.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailLayout {
    #[serde(default)]
    pub top: Vec<String>,
    #[serde(default)]
    pub left: Vec<String>,
    #[serde(default)]
    pub right: Vec<String>,
}

impl DetailLayout {
    pub fn zone(&self, zone: DetailZone) -> &[String] {
        match zone {
            DetailZone::Top => &self.top,
            DetailZone::Left => &self.left,
            DetailZone::Right => &self.right,
        }
    }

    pub(crate) fn zone_mut(&mut self, zone: DetailZone) -> &mut Vec<String> {
        match zone {
            DetailZone::Top => &mut self.top,
            DetailZone::Left => &mut self.left,
            DetailZone::Right => &mut self.right,
        }
    }

    pub fn zone_of(&self, id: &str) -> Option<DetailZone> {
        DetailZone::ALL
            .into_iter()
            .find(|z| self.zone(*z).iter().any(|f| f == id))
    }

    /// All placed ids, top zone first.
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.top.iter().chain(self.left.iter()).chain(self.right.iter())
    }

    /// Move `id` into `zone` at `index` (clamped), removing it from wherever it was.
    pub fn place(&mut self, id: &str, zone: DetailZone, index: usize) {
        self.hide(id);
        let target = self.zone_mut(zone);
        let at = index.min(target.len());
        target.insert(at, id.to_string());
    }

    /// Remove `id` from every zone. Returns whether it was placed.
    pub fn hide(&mut self, id: &str) -> bool {
        let mut removed = false;
        for zone in DetailZone::ALL {
            let ids = self.zone_mut(zone);
            let before = ids.len();
            ids.retain(|f| f != id);
            removed |= ids.len() != before;
        }
        removed
    }
}

/// Style of one zone (header row, table rows, detail cards) in one theme.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneStyles {
    #[serde(default)]
    pub header: StyleBlock,
    #[serde(default)]
    pub row: StyleBlock,
    #[serde(default)]
    pub card: StyleBlock,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeStyles {
    #[serde(default)]
    pub light: ZoneStyles,
    #[serde(default)]
    pub dark: ZoneStyles,
}

/// Form, detail and card arrangement plus style blocks; persisted under `entityConfig`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityLayout {
    #[serde(default)]
    pub form_layout: Vec<FormLayoutItem>,
    #[serde(default)]
    pub detail_layout: DetailLayout,
    /// Order of the related sub-panels under the detail card.
    #[serde(default)]
    pub cards_layout: Vec<String>,
    #[serde(default)]
    pub themes: ThemeStyles,
    /// Keys from older record shapes, kept so migration never discards data.
    #[serde(flatten)]
    pub legacy: Map<String, Value>,
}

/// Replacement for the consumer-editable parts of [`EntityLayout`]; absent parts are kept.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityLayoutUpdate {
    #[serde(default)]
    pub form_layout: Option<Vec<FormLayoutItem>>,
    #[serde(default)]
    pub detail_layout: Option<DetailLayout>,
    #[serde(default)]
    pub cards_layout: Option<Vec<String>>,
    #[serde(default)]
    pub themes: Option<ThemeStyles>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// The unit of persistence: everything one entity's views are driven from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateConfiguration {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub columns: ColumnRegistry,
    #[serde(default)]
    pub actions: ActionRegistry,
    #[serde(default, rename = "entityConfig")]
    pub layout: EntityLayout,
    #[serde(default)]
    pub sort: SortSpec,
    #[serde(default)]
    pub pagination: Pagination,
}
