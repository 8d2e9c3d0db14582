//! Store settings from the environment.

use crate::config::DEFAULT_PAGE_SIZE;
use std::path::PathBuf;

pub const DEFAULT_DIR: &str = ".entity-config";
pub const DEFAULT_NAMESPACE: &str = "entity_config";

#[derive(Clone, Debug, PartialEq)]
pub struct StoreSettings {
    /// Root directory of the file backend.
    pub dir: PathBuf,
    /// Prefix of every storage key.
    pub namespace: String,
    /// Page size written into synthesized configurations.
    pub page_size: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            dir: PathBuf::from(DEFAULT_DIR),
            namespace: DEFAULT_NAMESPACE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl StoreSettings {
    /// `ENTITY_CONFIG_DIR`, `ENTITY_CONFIG_NAMESPACE` and `ENTITY_CONFIG_PAGE_SIZE`; unset or
    /// unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = StoreSettings::default();
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());
        StoreSettings {
            dir: non_empty("ENTITY_CONFIG_DIR").map(PathBuf::from).unwrap_or(defaults.dir),
            namespace: non_empty("ENTITY_CONFIG_NAMESPACE").unwrap_or(defaults.namespace),
            page_size: non_empty("ENTITY_CONFIG_PAGE_SIZE")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.page_size),
        }
    }
}
