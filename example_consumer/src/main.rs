//! Example consumer: loads an entity configuration from the file backend, prints it, and
//! evaluates a small batch of records against a filter.
//!
//! Run from repo root: `cargo run -p example-consumer -- company`

use entity_config::{
    ConfigService, ConfigStore, FilterGroup, FilterOperator, FilterRule, StoreSettings,
};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("entity_config=info")),
        )
        .init();

    let entity_id = std::env::args().nth(1).unwrap_or_else(|| "company".into());
    let settings = StoreSettings::from_env();
    let service = ConfigService::open(ConfigStore::from_settings(&settings), &entity_id)?;
    if let Some(warning) = service.load_warning() {
        tracing::warn!("{}", warning);
    }

    let config = service.snapshot();
    tracing::info!(
        entity_id = %entity_id,
        dir = %settings.dir.display(),
        columns = config.columns.len(),
        actions = config.actions.len(),
        "configuration loaded"
    );
    println!("{}", serde_json::to_string_pretty(&*config)?);

    let records: Vec<_> = [
        json!({ "name": "Acme Corp", "status": "Active", "email": ["ceo@acme.io"] }),
        json!({ "name": "Globex", "status": "Inactive", "email": [] }),
    ]
    .into_iter()
    .filter_map(|v| v.as_object().cloned())
    .collect();
    let active = FilterGroup::all(vec![FilterRule::new("status", FilterOperator::Is, "Active")]);
    let evaluations = service.evaluate(&records, &active);
    println!("{}", serde_json::to_string_pretty(&evaluations)?);
    Ok(())
}
