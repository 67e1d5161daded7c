pub mod config;
pub mod db;
pub mod error;
pub mod logging;

pub use config::StoreConfig;
pub use db::migrations::{MigrationStep, Migrator};
pub use db::schema::{SchemaRegistry, SchemaVersion, TableDefinition, SCHEMA_VERSION};
pub use db::{open_or_create, StoreGate, StoreHandle};
pub use error::AppError;

/// Load config, open the store at `config_file`'s location (or the default
/// one) and bring it to the current schema version.
pub fn run(config_file: Option<&std::path::Path>) -> Result<std::sync::Arc<StoreHandle>, AppError> {
    let config = StoreConfig::load(config_file)?;
    tracing::info!("Starting bank-store v{}", env!("CARGO_PKG_VERSION"));

    let gate = StoreGate::new(config);
    let store = gate.get_or_open()?;
    tracing::info!(
        path = %store.location().display(),
        version = %store.version(),
        "Store is at the current schema version"
    );
    Ok(store)
}
