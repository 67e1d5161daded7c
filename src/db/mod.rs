pub mod cursor;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod legacy_providers;
pub mod migrations;
pub mod models;
pub mod schema;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use r2d2::{CustomizeConnection, Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::TransactionBehavior;

use crate::config::StoreConfig;
use crate::error::AppError;
use migrations::{read_version, write_version, Migrator};
use schema::{SchemaRegistry, SchemaVersion};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Connection customizer that sets per-connection SQLite pragmas.
#[derive(Debug)]
struct SqlitePragmaCustomizer {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<rusqlite::Connection, rusqlite::Error> for SqlitePragmaCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {};
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))?;
        Ok(())
    }
}

/// An opened store at the current schema version.
pub struct StoreHandle {
    pool: DbPool,
    location: PathBuf,
    version: SchemaVersion,
}

impl StoreHandle {
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, AppError> {
        Ok(self.pool.get()?)
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("location", &self.location)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Open the store at `config.location`, creating or upgrading it to `target`.
///
/// A fresh store (version 0) gets every table of `registry`; an older store
/// is upgraded by the standard migration steps. A store written by a newer
/// build is refused.
pub fn open_or_create(
    config: &StoreConfig,
    target: SchemaVersion,
    registry: &SchemaRegistry,
) -> Result<StoreHandle, AppError> {
    open_with(config, target, registry, &Migrator::standard())
}

pub fn open_with(
    config: &StoreConfig,
    target: SchemaVersion,
    registry: &SchemaRegistry,
    migrator: &Migrator,
) -> Result<StoreHandle, AppError> {
    if let Some(dir) = config.location.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }

    tracing::info!(path = %config.location.display(), "Opening store");

    let manager = SqliteConnectionManager::file(&config.location);
    let pool = Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(Duration::from_millis(config.busy_timeout_ms.max(1000)))
        .connection_customizer(Box::new(SqlitePragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
        }))
        .build(manager)?;

    let version = {
        let mut conn = pool.get()?;
        // Database-wide, only needs to run once.
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        prepare_schema(&mut conn, target, registry, migrator)?
    };

    tracing::info!(version = %version, "Store ready");
    Ok(StoreHandle {
        pool,
        location: config.location.clone(),
        version,
    })
}

/// Bring the schema behind `conn` to `target` and return the version reached.
pub fn prepare_schema(
    conn: &mut rusqlite::Connection,
    target: SchemaVersion,
    registry: &SchemaRegistry,
    migrator: &Migrator,
) -> Result<SchemaVersion, AppError> {
    let stored = read_version(conn)?;
    tracing::debug!(stored, target = %target, "Read stored schema version");

    let stored = u32::try_from(stored)
        .ok()
        .filter(|v| *v <= target.0)
        .map(SchemaVersion)
        .ok_or(AppError::UnsupportedVersion {
            stored,
            target: target.0,
        })?;

    if stored == SchemaVersion::EMPTY {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        registry.create_all(&tx)?;
        write_version(&tx, target)?;
        tx.commit()?;
        tracing::info!(version = %target, "Created fresh schema");
        return Ok(target);
    }

    migrator.upgrade(conn, stored, target)
}

/// One-time initialization guard for a store.
///
/// Construct one at startup and share it by reference. The first
/// `get_or_open` opens (and if needed migrates) the store; concurrent callers
/// wait for it and receive the same handle. A failed open is not remembered,
/// the next call tries again.
pub struct StoreGate {
    config: StoreConfig,
    registry: SchemaRegistry,
    handle: OnceLock<Arc<StoreHandle>>,
    opening: Mutex<()>,
}

impl StoreGate {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_registry(config, SchemaRegistry::current())
    }

    pub fn with_registry(config: StoreConfig, registry: SchemaRegistry) -> Self {
        Self {
            config,
            registry,
            handle: OnceLock::new(),
            opening: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn get(&self) -> Option<Arc<StoreHandle>> {
        self.handle.get().cloned()
    }

    pub fn get_or_open(&self) -> Result<Arc<StoreHandle>, AppError> {
        if let Some(handle) = self.handle.get() {
            return Ok(Arc::clone(handle));
        }

        let _opening = self
            .opening
            .lock()
            .map_err(|_| AppError::Internal("store gate lock poisoned".into()))?;

        if let Some(handle) = self.handle.get() {
            return Ok(Arc::clone(handle));
        }

        let handle = Arc::new(open_or_create(
            &self.config,
            self.registry.target_version(),
            &self.registry,
        )?);
        // Cannot already be set: every writer holds `opening`.
        let _ = self.handle.set(Arc::clone(&handle));
        Ok(handle)
    }
}

#[cfg(test)]
pub fn init_test_db() -> Result<StoreHandle, AppError> {
    // Use a unique temp file for each test to avoid in-memory connection issues with r2d2.
    let tmp = std::env::temp_dir().join(format!("bank_store_test_{}.db", uuid::Uuid::new_v4()));
    let config = StoreConfig {
        pool_size: 2,
        ..StoreConfig::at(tmp)
    };
    open_or_create(&config, schema::SCHEMA_VERSION, &SchemaRegistry::current())
}
