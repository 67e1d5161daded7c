use serde::Serialize;

/// Store-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes as `{ error, kind }` so hosts can surface structured failures.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Unsupported schema version {stored} (this build supports up to {target})")]
    UnsupportedVersion { stored: i64, target: u32 },

    #[error("Connection {0} already exists")]
    DuplicateConnection(i64),

    #[error("Migration step '{step}' (threshold {threshold}) failed: {source}")]
    Migration {
        step: &'static str,
        threshold: u32,
        #[source]
        source: Box<AppError>,
    },

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::Pool(_) => "pool",
            AppError::Io(_) => "io",
            AppError::Config(_) => "config",
            AppError::ConfigParse(_) => "config",
            AppError::UnsupportedVersion { .. } => "unsupported_version",
            AppError::DuplicateConnection(_) => "duplicate_connection",
            AppError::Migration { .. } => "migration",
            AppError::Internal(_) => "internal",
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field("kind", self.kind())?;
        s.end()
    }
}
