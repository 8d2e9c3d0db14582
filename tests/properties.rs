//! Property tests: layout sync, migration and formula parsing over generated configurations.

use entity_config::config::{
    is_system_field, synchronize, ColumnStyle, DetailLayout, FieldDefinition, FormLayoutItem, PinnedEdge, SortSpec,
};
use entity_config::eval::{Formula, FormulaError, MAX_DEPTH};
use entity_config::{
    default_configuration, migrate, validate, AggregateConfiguration, ConfigBackend, ConfigStore, FieldType,
    FormulaEvaluator, LoadSource, MemoryBackend, MigrationContext, Record, StoreSettings,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Ids generated layouts draw from: regular fields, system fields and ids no field has.
const ID_POOL: &[&str] = &[
    "name", "email", "industry", "revenue", "score", "select", "actions", "createdAt", "updatedAt", "ghost", "gone",
];

const FIELD_IDS: &[&str] = &["name", "email", "industry", "revenue", "score", "select", "actions", "createdAt"];

fn ctx() -> MigrationContext<'static> {
    MigrationContext {
        entity_id: "company",
        page_size: 25,
    }
}

fn arb_pool_id() -> impl Strategy<Value = String> {
    prop::sample::select(ID_POOL).prop_map(String::from)
}

fn arb_field_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        Just(FieldType::Text),
        Just(FieldType::Number),
        Just(FieldType::Date),
        Just(FieldType::Url),
        any::<bool>().prop_map(|multiple| FieldType::Email { multiple }),
        (prop::collection::vec("[A-Z][a-z]{1,6}", 0..4), any::<bool>())
            .prop_map(|(options, multiple)| FieldType::Select { options, multiple }),
        prop::sample::select(FIELD_IDS).prop_map(|id| FieldType::Formula {
            expression: format!("{{{}}} + 1", id),
        }),
    ]
}

/// Column map as persisted JSON. Some inner ids disagree with their key.
fn arb_columns() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(
        prop::sample::select(FIELD_IDS).prop_map(String::from),
        (arb_field_type(), any::<bool>(), any::<bool>(), 0i64..20, any::<bool>()),
        0..FIELD_IDS.len(),
    )
    .prop_map(|fields| {
        let columns: Map<String, Value> = fields
            .into_iter()
            .map(|(key, (field_type, mandatory, visible, order, renamed))| {
                let def = FieldDefinition {
                    id: if renamed { format!("{}_old", key) } else { key.clone() },
                    label: key.to_uppercase(),
                    field_type,
                    is_mandatory: mandatory,
                    order,
                    pinned: PinnedEdge::None,
                    visible,
                    merge_target: None,
                    style: ColumnStyle::default(),
                };
                let value = serde_json::to_value(def).unwrap();
                (key, value)
            })
            .collect();
        Value::Object(columns)
    })
}

fn arb_form_layout() -> impl Strategy<Value = Vec<FormLayoutItem>> {
    prop::collection::vec((arb_pool_id(), any::<bool>(), any::<bool>()), 0..12).prop_map(|items| {
        items
            .into_iter()
            .map(|(id, visible, required)| {
                let mut item = FormLayoutItem::new(id);
                item.visible = visible;
                item.required = required;
                item
            })
            .collect()
    })
}

fn arb_detail_layout() -> impl Strategy<Value = DetailLayout> {
    let zone = || prop::collection::vec(arb_pool_id(), 0..6);
    (zone(), zone(), zone()).prop_map(|(top, left, right)| DetailLayout { top, left, right })
}

fn arb_config() -> impl Strategy<Value = AggregateConfiguration> {
    (
        arb_columns(),
        arb_form_layout(),
        arb_detail_layout(),
        prop::option::of(arb_pool_id()),
    )
        .prop_map(|(columns, form_layout, detail_layout, sort_field)| {
            let mut config = default_configuration("company", 25);
            config.columns = serde_json::from_value(columns).unwrap();
            config.layout.form_layout = form_layout;
            config.layout.detail_layout = detail_layout;
            config.sort = SortSpec {
                field: sort_field,
                ..Default::default()
            };
            config
        })
}

/// A legacy record: free-form type names on columns and cached types on layout entries.
fn arb_legacy_record() -> impl Strategy<Value = Value> {
    let column = ("[a-z]{1,8}", any::<bool>());
    let entry = (arb_pool_id(), "[a-z]{1,8}", any::<bool>(), any::<bool>());
    (
        prop::collection::btree_map(prop::sample::select(FIELD_IDS).prop_map(String::from), column, 1..6),
        prop::collection::vec(entry, 0..8),
    )
        .prop_map(|(columns, layout)| {
            let columns: Map<String, Value> = columns
                .into_iter()
                .map(|(key, (type_name, pinned))| {
                    let value = json!({ "label": key, "type": type_name, "pinned": pinned });
                    (key, value)
                })
                .collect();
            let layout: Vec<Value> = layout
                .into_iter()
                .map(|(id, type_name, visible, required)| {
                    json!({
                        "id": id,
                        "type": type_name,
                        "dropdownOptions": type_name,
                        "isMultiSelect": "no",
                        "visible": visible,
                        "required": required
                    })
                })
                .collect();
            json!({ "columns": columns, "entityConfig": { "layout": layout } })
        })
}

fn assert_no_orphans(config: &AggregateConfiguration) {
    for item in &config.layout.form_layout {
        assert!(config.columns.contains(&item.id), "orphan form item {}", item.id);
        assert!(!is_system_field(&item.id));
    }
    for id in config.layout.detail_layout.ids() {
        assert!(config.columns.contains(id), "orphan detail id {}", id);
        assert!(!is_system_field(id));
    }
    if let Some(field) = config.sort.field.as_deref() {
        assert!(config.columns.contains(field));
    }
}

proptest! {
    #[test]
    fn sync_twice_is_a_no_op(mut config in arb_config()) {
        synchronize(&mut config);
        let once = config.clone();
        let second = synchronize(&mut config);
        prop_assert!(second.is_noop(), "second pass changed something: {:?}", second);
        prop_assert_eq!(config, once);
    }

    #[test]
    fn synced_config_is_valid_and_has_no_orphans(mut config in arb_config()) {
        synchronize(&mut config);
        prop_assert!(validate(&config).is_ok(), "{:?}", validate(&config));
        assert_no_orphans(&config);
        for def in config.columns.iter() {
            let key_matches = config.columns.get(&def.id).is_some_and(|d| d.id == def.id);
            prop_assert!(key_matches);
        }
    }

    #[test]
    fn migrating_a_current_record_is_byte_identical(mut config in arb_config()) {
        synchronize(&mut config);
        let mut doc = serde_json::to_value(&config).unwrap();
        let before = serde_json::to_vec(&doc).unwrap();
        let applied = migrate(&mut doc, &ctx()).unwrap();
        prop_assert!(applied.is_empty(), "steps applied to a current record: {:?}", applied);
        prop_assert_eq!(serde_json::to_vec(&doc).unwrap(), before);
        let reread: AggregateConfiguration = serde_json::from_value(doc).unwrap();
        prop_assert_eq!(reread, config);
    }

    #[test]
    fn legacy_records_keep_their_columns(record in arb_legacy_record()) {
        let backend = MemoryBackend::new();
        backend.write("entity_config.company", &serde_json::to_vec(&record).unwrap()).unwrap();
        let store = ConfigStore::new(backend, &StoreSettings::default());
        let outcome = store.load("company").unwrap();
        let is_persisted = matches!(outcome.source, LoadSource::Persisted { .. });
        prop_assert!(is_persisted, "{:?}", outcome.source);
        for key in record["columns"].as_object().unwrap().keys() {
            prop_assert!(outcome.config.columns.contains(key), "lost column {}", key);
        }
        assert_no_orphans(&outcome.config);
        prop_assert!(validate(&outcome.config).is_ok());

        let mut again = serde_json::to_value(&outcome.config).unwrap();
        prop_assert!(migrate(&mut again, &ctx()).unwrap().is_empty());
    }

    #[test]
    fn arbitrary_input_never_panics_the_evaluator(source in ".{0,64}", a in any::<i32>(), b in any::<i32>()) {
        let record: Record = json!({ "a": a, "b": b }).as_object().cloned().unwrap();
        let value = FormulaEvaluator::default().evaluate(&source, &record);
        if Formula::parse(&source).is_err() {
            prop_assert!(value.is_error());
        }
    }

    #[test]
    fn nesting_depth_is_bounded(depth in 0usize..400) {
        let source = format!("{}7{}", "(".repeat(depth), ")".repeat(depth));
        match Formula::parse(&source) {
            Ok(_) => prop_assert!(depth <= MAX_DEPTH),
            Err(e) => {
                prop_assert!(depth > MAX_DEPTH);
                prop_assert_eq!(e, FormulaError::TooDeep);
            }
        }
    }
}
