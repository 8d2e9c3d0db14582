//! Typed errors for configuration invariants and the store layer.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown {kind} id '{id}'")]
    UnknownReference { kind: &'static str, id: String },
    #[error("missing reference: {kind} id '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },
    #[error("field '{id}' is mandatory and cannot be {action}")]
    MandatoryField { id: String, action: &'static str },
    #[error("action '{0}' is a system action and cannot be removed")]
    SystemAction(String),
    #[error("validation: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn unknown_field(id: &str) -> Self {
        ConfigError::UnknownReference {
            kind: "field",
            id: id.to_string(),
        }
    }

    pub fn unknown_action(id: &str) -> Self {
        ConfigError::UnknownReference {
            kind: "action",
            id: id.to_string(),
        }
    }

    /// True for errors that leave the configuration untouched because the target did not exist.
    pub fn is_unknown_reference(&self) -> bool {
        matches!(self, ConfigError::UnknownReference { .. })
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid entity id: {0}")]
    InvalidEntityId(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("migration: {0}")]
    Migration(#[from] crate::migration::MigrationError),
    #[error("backend: {0}")]
    Backend(String),
}
