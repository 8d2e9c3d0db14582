//! Config persistence: one JSON record per entity id behind a key-value backend.
//! Storage keys are `<namespace>.<entity_id>`; the namespace comes from `ENTITY_CONFIG_NAMESPACE`.

use crate::config::{default_configuration, synchronize, AggregateConfiguration};
use crate::error::EngineError;
use crate::migration::{migrate, MigrationContext};
use crate::settings::StoreSettings;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};
use tracing::{debug, info, warn};

/// Durable key-value storage for serialized configurations.
pub trait ConfigBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError>;
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), EngineError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> EngineError {
    EngineError::Backend("memory backend lock poisoned".into())
}

impl ConfigBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), EngineError> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per configuration under `root`. Writes go to a temp file that is
/// renamed over the target, so readers see the old or the new record, never a partial one.
#[derive(Clone, Debug)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileBackend { root: root.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

impl ConfigBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
        fs::create_dir_all(&self.root)?;
        let target = self.path(key);
        let tmp = self.root.join(format!(".{}.json.tmp", key));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), EngineError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn entity_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid entity id pattern"))
}

/// Entity ids become file names and key suffixes, so only `[A-Za-z0-9_-]` is allowed.
pub fn validate_entity_id(entity_id: &str) -> Result<(), EngineError> {
    if entity_id_pattern().is_match(entity_id) {
        Ok(())
    } else {
        Err(EngineError::InvalidEntityId(entity_id.to_string()))
    }
}

/// Namespace-qualified storage key (e.g. "entity_config.company").
pub fn storage_key(namespace: &str, entity_id: &str) -> String {
    format!("{}.{}", namespace, entity_id)
}

/// Where a loaded configuration came from.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadSource {
    /// Nothing persisted; defaults were synthesized.
    Defaults,
    /// Read from storage after the named migration steps.
    Persisted { migrated: Vec<&'static str> },
    /// The persisted record was unreadable; defaults were synthesized instead.
    Recovered { warning: String },
}

#[derive(Clone, Debug)]
pub struct LoadOutcome {
    pub config: AggregateConfiguration,
    pub source: LoadSource,
}

impl LoadOutcome {
    pub fn warning(&self) -> Option<&str> {
        match &self.source {
            LoadSource::Recovered { warning } => Some(warning),
            _ => None,
        }
    }

    /// True when the in-memory configuration differs in shape from what is stored.
    pub fn needs_save(&self) -> bool {
        matches!(&self.source, LoadSource::Persisted { migrated } if !migrated.is_empty())
    }
}

/// The only read/write path to persisted configurations.
pub struct ConfigStore<B> {
    backend: B,
    namespace: String,
    page_size: u32,
}

impl ConfigStore<FileBackend> {
    pub fn from_settings(settings: &StoreSettings) -> Self {
        ConfigStore::new(FileBackend::new(settings.dir.clone()), settings)
    }
}

impl<B: ConfigBackend> ConfigStore<B> {
    pub fn new(backend: B, settings: &StoreSettings) -> Self {
        ConfigStore {
            backend,
            namespace: settings.namespace.clone(),
            page_size: settings.page_size,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn key(&self, entity_id: &str) -> Result<String, EngineError> {
        validate_entity_id(entity_id)?;
        Ok(storage_key(&self.namespace, entity_id))
    }

    pub fn defaults(&self, entity_id: &str) -> AggregateConfiguration {
        default_configuration(entity_id, self.page_size)
    }

    /// Load, migrate and synchronize. Absent records yield defaults; unreadable ones yield
    /// defaults plus a warning. Only backend failures and bad entity ids are errors.
    pub fn load(&self, entity_id: &str) -> Result<LoadOutcome, EngineError> {
        let key = self.key(entity_id)?;
        let Some(bytes) = self.backend.read(&key)? else {
            debug!(entity_id = %entity_id, "no persisted config, using defaults");
            return Ok(LoadOutcome {
                config: self.defaults(entity_id),
                source: LoadSource::Defaults,
            });
        };
        match self.decode(entity_id, &bytes) {
            Ok((config, migrated)) => Ok(LoadOutcome {
                config,
                source: LoadSource::Persisted { migrated },
            }),
            Err(e) => {
                let warning = format!("persisted config for '{}' is unreadable ({}); using defaults", entity_id, e);
                warn!(entity_id = %entity_id, error = %e, "persisted config is unreadable, using defaults");
                Ok(LoadOutcome {
                    config: self.defaults(entity_id),
                    source: LoadSource::Recovered { warning },
                })
            }
        }
    }

    fn decode(&self, entity_id: &str, bytes: &[u8]) -> Result<(AggregateConfiguration, Vec<&'static str>), EngineError> {
        let mut doc: serde_json::Value = serde_json::from_slice(bytes)?;
        let ctx = MigrationContext {
            entity_id,
            page_size: self.page_size,
        };
        let migrated = migrate(&mut doc, &ctx)?;
        let mut config: AggregateConfiguration = serde_json::from_value(doc)?;
        config.entity_id = entity_id.to_string();
        synchronize(&mut config);
        Ok((config, migrated))
    }

    /// Serialize and write. Returns false when the stored bytes were already identical.
    pub fn save(&self, config: &AggregateConfiguration) -> Result<bool, EngineError> {
        let key = self.key(&config.entity_id)?;
        let bytes = serde_json::to_vec_pretty(config)?;
        if self.backend.read(&key)?.as_deref() == Some(bytes.as_slice()) {
            debug!(entity_id = %config.entity_id, "config unchanged, skipping write");
            return Ok(false);
        }
        self.backend.write(&key, &bytes)?;
        debug!(entity_id = %config.entity_id, bytes = bytes.len(), "config saved");
        Ok(true)
    }

    /// Discard the persisted record and return fresh defaults.
    pub fn reset_to_defaults(&self, entity_id: &str) -> Result<AggregateConfiguration, EngineError> {
        let key = self.key(entity_id)?;
        self.backend.remove(&key)?;
        info!(entity_id = %entity_id, "config reset to defaults");
        Ok(self.defaults(entity_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldType, NewField};

    fn store() -> ConfigStore<MemoryBackend> {
        ConfigStore::new(MemoryBackend::new(), &StoreSettings::default())
    }

    #[test]
    fn absent_record_loads_defaults() {
        let outcome = store().load("company").unwrap();
        assert_eq!(outcome.source, LoadSource::Defaults);
        assert_eq!(outcome.config.entity_id, "company");
        assert!(outcome.warning().is_none());
    }

    #[test]
    fn saved_config_loads_back_without_migration() {
        let store = store();
        let mut config = store.defaults("company");
        config
            .columns
            .add_field(NewField::new("Industry", FieldType::Text).with_id("industry"))
            .unwrap();
        synchronize(&mut config);
        assert!(store.save(&config).unwrap());
        assert!(!store.save(&config).unwrap());

        let outcome = store.load("company").unwrap();
        assert_eq!(outcome.source, LoadSource::Persisted { migrated: vec![] });
        assert!(!outcome.needs_save());
        assert_eq!(outcome.config, config);
    }

    #[test]
    fn corrupt_record_recovers_with_warning() {
        let store = store();
        store
            .backend()
            .write(&storage_key("entity_config", "company"), b"{not json")
            .unwrap();
        let outcome = store.load("company").unwrap();
        assert!(outcome.warning().unwrap().contains("company"));
        assert_eq!(outcome.config, store.defaults("company"));
    }

    #[test]
    fn wrong_shape_recovers_too() {
        let store = store();
        store
            .backend()
            .write(&storage_key("entity_config", "company"), br#"{"columns": {"name": 5}, "actions": "nope"}"#)
            .unwrap();
        assert!(matches!(store.load("company").unwrap().source, LoadSource::Recovered { .. }));
    }

    #[test]
    fn invalid_entity_ids_are_rejected() {
        let store = store();
        for bad in ["", "../etc", "a b", "x.y"] {
            assert!(matches!(store.load(bad), Err(EngineError::InvalidEntityId(_))), "{}", bad);
        }
    }

    #[test]
    fn reset_discards_persisted_record() {
        let store = store();
        let mut config = store.defaults("company");
        config.pagination.page_size = 100;
        store.save(&config).unwrap();
        let reset = store.reset_to_defaults("company").unwrap();
        assert_eq!(reset.pagination.page_size, 25);
        assert_eq!(store.load("company").unwrap().source, LoadSource::Defaults);
    }
}
