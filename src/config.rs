use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;

const ENV_PATH: &str = "BANK_STORE_PATH";
const ENV_POOL_SIZE: &str = "BANK_STORE_POOL_SIZE";
const ENV_BUSY_TIMEOUT: &str = "BANK_STORE_BUSY_TIMEOUT_MS";

const DEFAULT_POOL_SIZE: u32 = 4;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Where the store lives and how its connections are tuned.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub location: PathBuf,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            pool_size: DEFAULT_POOL_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    /// Config pointing at an explicit file, everything else defaulted.
    pub fn at(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Load config from an optional TOML file, then apply environment overrides.
    ///
    /// Priority: `BANK_STORE_*` env vars → TOML file → built-in defaults.
    pub fn load(file: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match file {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(env_var_nonempty)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), AppError> {
        if let Some(path) = lookup(ENV_PATH) {
            self.location = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_POOL_SIZE) {
            self.pool_size = raw
                .parse()
                .map_err(|_| AppError::Config(format!("{ENV_POOL_SIZE} must be an integer, got '{raw}'")))?;
        }
        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT) {
            self.busy_timeout_ms = raw
                .parse()
                .map_err(|_| AppError::Config(format!("{ENV_BUSY_TIMEOUT} must be an integer, got '{raw}'")))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.location.as_os_str().is_empty() {
            return Err(AppError::Config("location cannot be empty".into()));
        }
        if self.pool_size == 0 {
            return Err(AppError::Config("pool_size must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_location() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bank-store")
        .join("bank.db")
}

/// Return the trimmed value of an environment variable, if set and non-empty.
fn env_var_nonempty(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}
