use std::fmt;

use rusqlite::{Connection, Transaction};
use serde::Serialize;

use crate::error::AppError;

/// Version of the schema this build writes.
pub const SCHEMA_VERSION: SchemaVersion = SchemaVersion(13);

pub const CONNECTION_TABLE: &str = "connections";
pub const PROPERTY_TABLE: &str = "connection_properties";
pub const ACCOUNT_TABLE: &str = "accounts";
pub const TRANSACTION_TABLE: &str = "transactions";

/// Schema version as persisted in `PRAGMA user_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SchemaVersion(pub u32);

impl SchemaVersion {
    /// A store that has never been initialized.
    pub const EMPTY: SchemaVersion = SchemaVersion(0);

    pub fn next(self) -> SchemaVersion {
        SchemaVersion(self.0 + 1)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A table and the literal statement that creates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: &'static str,
    pub create_statement: &'static str,
}

// ============================================================================
// Current schema (fresh stores)
// ============================================================================

const TABLES: &[TableDefinition] = &[
    TableDefinition {
        name: CONNECTION_TABLE,
        create_statement: "create table connections (
            id integer primary key,
            provider_id text not null,
            name text,
            enabled integer not null,
            last_updated text,
            sort_order integer
        );",
    },
    TableDefinition {
        name: ACCOUNT_TABLE,
        create_statement: "create table accounts (
            _id integer primary key autoincrement,
            balance text not null,
            acctype integer not null,
            name text not null,
            bankid integer not null,
            id text not null,
            hidden integer,
            notify integer,
            currency text,
            aliasfor text
        );",
    },
    TableDefinition {
        name: TRANSACTION_TABLE,
        create_statement: "create table transactions (
            _id integer primary key autoincrement,
            transdate text not null,
            btransaction text not null,
            amount text not null,
            account text not null,
            currency text
        );",
    },
    TableDefinition {
        name: PROPERTY_TABLE,
        create_statement: "create table connection_properties (
            connection_id integer not null,
            property_key text not null,
            property_value text,
            primary key (connection_id, property_key)
        );",
    },
];

/// Static declarations of the current schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaRegistry {
    version: SchemaVersion,
    tables: &'static [TableDefinition],
}

impl SchemaRegistry {
    /// The registry shipped with this build.
    pub const fn current() -> Self {
        Self {
            version: SCHEMA_VERSION,
            tables: TABLES,
        }
    }

    pub fn target_version(&self) -> SchemaVersion {
        self.version
    }

    pub fn tables(&self) -> &'static [TableDefinition] {
        self.tables
    }

    /// Issue every creation statement. A failure here is a broken build, so
    /// it is propagated as-is and the caller's transaction rolls back.
    pub fn create_all(&self, tx: &Transaction<'_>) -> Result<(), AppError> {
        for table in self.tables {
            tx.execute_batch(table.create_statement)?;
            tracing::debug!(table = table.name, "Created table");
        }
        Ok(())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::current()
    }
}

// ============================================================================
// Introspection
// ============================================================================

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool, AppError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, AppError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Column names of `table` in declaration order; empty when the table is missing.
pub fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let rows = stmt.query_map([table], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}
