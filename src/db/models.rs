use std::fmt;

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::db::cursor::FromRow;

// ============================================================================
// Canonical schema
// ============================================================================

/// A configured connection to a bank provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConnection {
    pub id: i64,
    pub name: Option<String>,
    pub provider_id: String,
    pub enabled: bool,
    pub last_updated: Option<String>,
    pub sort_order: i64,
}

impl FromRow for ProviderConnection {
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "provider_id", "enabled", "last_updated", "sort_order"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            provider_id: row.get(2)?,
            enabled: row.get::<_, i64>(3)? != 0,
            last_updated: row.get(4)?,
            sort_order: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        })
    }
}

/// Keys of the per-connection property table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKey {
    Username,
    Password,
    Extras,
}

impl PropertyKey {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyKey::Username => "username",
            PropertyKey::Password => "password",
            PropertyKey::Extras => "extras",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "username" => Some(PropertyKey::Username),
            "password" => Some(PropertyKey::Password),
            "extras" => Some(PropertyKey::Extras),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One key/value setting of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperty {
    pub connection_id: i64,
    pub key: PropertyKey,
    pub value: Option<String>,
}

impl FromRow for ConnectionProperty {
    const COLUMNS: &'static [&'static str] = &["connection_id", "property_key", "property_value"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw_key: String = row.get(1)?;
        let key = PropertyKey::parse(&raw_key).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown property key '{raw_key}'").into(),
            )
        })?;
        Ok(Self {
            connection_id: row.get(0)?,
            key,
            value: row.get(2)?,
        })
    }
}

// ============================================================================
// Legacy `banks` table projections
// ============================================================================

/// Credential columns of a legacy bank row, read before they are split out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCredentialRow {
    pub id: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub extras: Option<String>,
}

impl LegacyCredentialRow {
    /// `extras` is only worth keeping when it carries data.
    pub fn extras(&self) -> Option<&str> {
        self.extras.as_deref().filter(|e| !e.is_empty())
    }
}

impl FromRow for LegacyCredentialRow {
    const COLUMNS: &'static [&'static str] = &["_id", "username", "password", "extras"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            password: row.get(2)?,
            extras: row.get(3)?,
        })
    }
}

/// Descriptive columns of a legacy bank row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyBankRow {
    pub id: i64,
    pub name: Option<String>,
    /// `None` when the stored value is not an integer.
    pub type_code: Option<i64>,
    pub disabled: bool,
    pub updated: Option<String>,
    pub sort_order: i64,
}

impl LegacyBankRow {
    /// Convert into a canonical connection for the given provider.
    /// Legacy rows stored `disabled`; canonical rows store `enabled`.
    pub fn into_connection(self, provider_id: &str) -> ProviderConnection {
        ProviderConnection {
            id: self.id,
            name: self.name,
            provider_id: provider_id.to_string(),
            enabled: !self.disabled,
            last_updated: self.updated,
            sort_order: self.sort_order,
        }
    }
}

impl FromRow for LegacyBankRow {
    const COLUMNS: &'static [&'static str] =
        &["_id", "custname", "banktype", "disabled", "updated", "sortorder"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            // The column has integer affinity only, so any value may be stored.
            type_code: match row.get::<_, Value>(2)? {
                Value::Integer(code) => Some(code),
                _ => None,
            },
            // Only an explicit 1 meant disabled.
            disabled: row.get::<_, Option<i64>>(3)? == Some(1),
            updated: row.get(4)?,
            sort_order: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
        })
    }
}
