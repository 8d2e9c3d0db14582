//! Layout synchronization: keeps form and detail layouts consistent with the column registry.
//!
//! This is the only code that writes the denormalized type/options cache of form items.

use crate::config::registry::ColumnRegistry;
use crate::config::types::{is_system_field, AggregateConfiguration, DetailZone, EntityLayout, FormLayoutItem, SortSpec};
use std::collections::HashSet;

/// What one sync pass changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncReport {
    /// Form items appended for fields that had none.
    pub added: Vec<String>,
    /// Ids dropped from the form layout or a detail zone.
    pub pruned: Vec<String>,
    /// Form items whose cached type/options were refreshed.
    pub refreshed: usize,
    pub sort_cleared: bool,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.pruned.is_empty() && self.refreshed == 0 && !self.sort_cleared
    }
}

/// Sync the whole aggregate. Idempotent.
pub fn synchronize(config: &mut AggregateConfiguration) -> SyncReport {
    let mut report = sync_layout(&config.columns, &mut config.layout);
    report.sort_cleared = prune_sort(&config.columns, &mut config.sort);
    if !report.is_noop() {
        tracing::debug!(
            entity_id = %config.entity_id,
            added = report.added.len(),
            pruned = report.pruned.len(),
            refreshed = report.refreshed,
            "layouts synchronized"
        );
    }
    report
}

fn is_live(columns: &ColumnRegistry, id: &str) -> bool {
    columns.contains(id) && !is_system_field(id)
}

/// Add missing form items, prune orphans from form and detail layouts, refresh form item caches.
pub fn sync_layout(columns: &ColumnRegistry, layout: &mut EntityLayout) -> SyncReport {
    let mut report = SyncReport::default();

    // Prune orphans and duplicates from the form layout.
    let mut seen: HashSet<String> = HashSet::new();
    layout.form_layout.retain(|item| {
        let keep = is_live(columns, &item.id) && seen.insert(item.id.clone());
        if !keep {
            report.pruned.push(item.id.clone());
        }
        keep
    });

    // Add missing, in field order.
    for def in columns.ordered() {
        if def.is_system() || seen.contains(&def.id) {
            continue;
        }
        seen.insert(def.id.clone());
        layout.form_layout.push(FormLayoutItem::new(def.id.clone()));
        report.added.push(def.id.clone());
    }

    // Refresh caches; the registry is authoritative.
    for item in layout.form_layout.iter_mut() {
        let Some(def) = columns.get(&item.id) else {
            continue;
        };
        let kind = def.field_type.kind();
        let options = def.field_type.options();
        let multi = def.field_type.is_multi_value();
        let mut changed = false;
        if item.field_type != kind {
            item.field_type = kind;
            changed = true;
        }
        if item.dropdown_options != options {
            item.dropdown_options = options.to_vec();
            changed = true;
        }
        if item.is_multi_select != multi {
            item.is_multi_select = multi;
            changed = true;
        }
        if def.is_mandatory && !item.visible {
            item.visible = true;
            changed = true;
        }
        if changed {
            report.refreshed += 1;
        }
    }

    // Detail zones: prune orphans and ids already placed in an earlier zone; never auto-populate.
    let mut placed: HashSet<String> = HashSet::new();
    for zone in DetailZone::ALL {
        layout.detail_layout.zone_mut(zone).retain(|id| {
            let keep = is_live(columns, id) && placed.insert(id.clone());
            if !keep {
                report.pruned.push(id.clone());
            }
            keep
        });
    }

    report
}

fn prune_sort(columns: &ColumnRegistry, sort: &mut SortSpec) -> bool {
    match sort.field.as_deref() {
        Some(field) if !columns.contains(field) => {
            sort.field = None;
            true
        }
        _ => false,
    }
}
