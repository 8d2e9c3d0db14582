//! ConfigService: persisted, synchronized mutations of one entity's configuration.

mod engine;
mod validation;
pub use engine::ConfigService;
pub use validation::{FieldViolation, RecordValidator};
