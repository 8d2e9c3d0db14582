//! Entity config: runtime-configurable entity schemas.
//!
//! Field definitions, the list/form/detail layouts derived from them, row actions, and the
//! per-record formula and filter evaluation that consumers render from.

pub mod config;
pub mod error;
pub mod eval;
pub mod migration;
pub mod service;
pub mod settings;
pub mod store;

pub use config::{
    default_configuration, synchronize, validate, ActionDefinition, ActionRegistry, AggregateConfiguration,
    ColumnRegistry, EntityLayoutUpdate, FieldDefinition, FieldType, FieldUpdate, NewField,
};
pub use error::{ConfigError, EngineError};
pub use eval::{
    evaluate_records, filter_records, FilterEngine, FilterGroup, FilterOperator, FilterRule, FormulaEvaluator,
    FormulaValue, MatchMode, Record,
};
pub use migration::{migrate, MigrationContext};
pub use service::{ConfigService, FieldViolation, RecordValidator};
pub use settings::StoreSettings;
pub use store::{ConfigBackend, ConfigStore, FileBackend, LoadOutcome, LoadSource, MemoryBackend};
