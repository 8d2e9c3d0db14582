//! ConfigService: the mutation surface for one entity's configuration.
//!
//! Every mutation works on a copy of the current configuration, resyncs layouts, persists,
//! and only then replaces the shared snapshot. A rejected mutation leaves both the snapshot
//! and the stored record untouched.

use crate::config::{
    dangling_formula_references, synchronize, ActionDefinition, ActionUpdate, AggregateConfiguration, EntityLayoutUpdate,
    FieldDefinition, FieldUpdate, NewField, SortSpec,
};
use crate::error::{ConfigError, EngineError};
use crate::eval::{evaluate_records, FilterGroup, Record, RecordEvaluation};
use crate::service::validation::{FieldViolation, RecordValidator};
use crate::store::{ConfigBackend, ConfigStore, LoadSource};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ConfigService<B> {
    store: ConfigStore<B>,
    current: Arc<AggregateConfiguration>,
    load_warning: Option<String>,
}

impl<B: ConfigBackend> ConfigService<B> {
    /// Load `entity_id` through the store. Migrated records are written back immediately.
    pub fn open(store: ConfigStore<B>, entity_id: &str) -> Result<Self, EngineError> {
        let outcome = store.load(entity_id)?;
        if outcome.needs_save() {
            store.save(&outcome.config)?;
        }
        if let LoadSource::Persisted { migrated } = &outcome.source {
            debug!(entity_id = %entity_id, ?migrated, "config loaded");
        }
        let load_warning = outcome.warning().map(String::from);
        Ok(ConfigService {
            store,
            current: Arc::new(outcome.config),
            load_warning,
        })
    }

    /// The current configuration. Holders keep a consistent view across later mutations.
    pub fn snapshot(&self) -> Arc<AggregateConfiguration> {
        Arc::clone(&self.current)
    }

    pub fn entity_id(&self) -> &str {
        &self.current.entity_id
    }

    /// Set when the last load had to fall back to defaults.
    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    pub fn store(&self) -> &ConfigStore<B> {
        &self.store
    }

    fn mutate<T>(
        &mut self,
        operation: &'static str,
        apply: impl FnOnce(&mut AggregateConfiguration) -> Result<T, ConfigError>,
    ) -> Result<T, EngineError> {
        let mut next = (*self.current).clone();
        let out = apply(&mut next)?;
        synchronize(&mut next);
        for (field, reference) in dangling_formula_references(&next) {
            warn!(entity_id = %next.entity_id, field = %field, reference = %reference, "formula references a missing field");
        }
        let written = self.store.save(&next)?;
        debug!(entity_id = %next.entity_id, operation, written, "config mutation applied");
        self.current = Arc::new(next);
        Ok(out)
    }

    pub fn add_field(&mut self, field: NewField) -> Result<String, EngineError> {
        self.mutate("add_field", |c| c.columns.add_field(field))
    }

    pub fn update_field(&mut self, id: &str, update: FieldUpdate) -> Result<(), EngineError> {
        self.mutate("update_field", |c| c.columns.update_field(id, update))
    }

    /// Remove a field; every layout reference to it is pruned before the result is stored.
    pub fn remove_field(&mut self, id: &str) -> Result<FieldDefinition, EngineError> {
        self.mutate("remove_field", |c| c.columns.remove_field(id))
    }

    pub fn reorder_fields(&mut self, ids: &[String]) -> Result<(), EngineError> {
        self.mutate("reorder_fields", |c| c.columns.reorder_fields(ids))
    }

    pub fn add_action(&mut self, action: ActionDefinition) -> Result<String, EngineError> {
        self.mutate("add_action", |c| c.actions.add_action(action))
    }

    pub fn update_action(&mut self, id: &str, update: ActionUpdate) -> Result<(), EngineError> {
        self.mutate("update_action", |c| c.actions.update_action(id, update))
    }

    pub fn remove_action(&mut self, id: &str) -> Result<ActionDefinition, EngineError> {
        self.mutate("remove_action", |c| c.actions.remove_action(id))
    }

    pub fn reorder_actions(&mut self, ids: &[String]) -> Result<(), EngineError> {
        self.mutate("reorder_actions", |c| c.actions.reorder_actions(ids))
    }

    /// Replace the given parts of the entity layout. Unknown ids in the new layouts are pruned
    /// by the sync pass; fields missing from a new form layout are appended.
    pub fn update_entity_layout(&mut self, update: EntityLayoutUpdate) -> Result<(), EngineError> {
        self.mutate("update_entity_layout", |c| {
            if let Some(form_layout) = update.form_layout {
                c.layout.form_layout = form_layout;
            }
            if let Some(detail_layout) = update.detail_layout {
                c.layout.detail_layout = detail_layout;
            }
            if let Some(cards_layout) = update.cards_layout {
                c.layout.cards_layout = cards_layout;
            }
            if let Some(themes) = update.themes {
                c.layout.themes = themes;
            }
            Ok(())
        })
    }

    pub fn set_sort(&mut self, sort: SortSpec) -> Result<(), EngineError> {
        self.mutate("set_sort", |c| {
            if let Some(field) = sort.field.as_deref() {
                if !c.columns.contains(field) {
                    return Err(ConfigError::unknown_field(field));
                }
            }
            c.sort = sort;
            Ok(())
        })
    }

    pub fn set_page_size(&mut self, page_size: u32) -> Result<(), EngineError> {
        self.mutate("set_page_size", |c| {
            if page_size == 0 {
                return Err(ConfigError::Validation("page size must be positive".into()));
            }
            c.pagination.page_size = page_size;
            Ok(())
        })
    }

    /// Re-read the stored record, picking up writes from other views of the same entity.
    pub fn reload(&mut self) -> Result<(), EngineError> {
        let entity_id = self.current.entity_id.clone();
        let outcome = self.store.load(&entity_id)?;
        self.load_warning = outcome.warning().map(String::from);
        self.current = Arc::new(outcome.config);
        Ok(())
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), EngineError> {
        let entity_id = self.current.entity_id.clone();
        let config = self.store.reset_to_defaults(&entity_id)?;
        info!(entity_id = %entity_id, "configuration reset");
        self.load_warning = None;
        self.current = Arc::new(config);
        Ok(())
    }

    pub fn evaluate(&self, records: &[Record], group: &FilterGroup) -> Vec<RecordEvaluation> {
        evaluate_records(&self.current, records, group)
    }

    pub fn validate_record(&self, record: &Record) -> Vec<FieldViolation> {
        RecordValidator::validate(&self.current, record)
    }
}
