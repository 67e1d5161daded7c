use std::fmt;

use rusqlite::{params, Connection, ErrorCode, Statement, Transaction, TransactionBehavior};

use crate::db::cursor::TableScan;
use crate::db::legacy_providers;
use crate::db::models::{ConnectionProperty, LegacyBankRow, LegacyCredentialRow, PropertyKey, ProviderConnection};
use crate::db::schema::{has_column, SchemaVersion, ACCOUNT_TABLE};
use crate::error::AppError;

/// Monolithic bank table of the legacy schema.
pub const LEGACY_BANK_TABLE: &str = "banks";
/// Where the legacy bank table is parked while it is rebuilt.
pub const LEGACY_BANK_TEMP_TABLE: &str = "banks_temp";

/// One schema transformation, applied to stores at or below `threshold`.
#[derive(Clone, Copy)]
pub struct MigrationStep {
    pub threshold: SchemaVersion,
    pub name: &'static str,
    pub apply: fn(&Transaction<'_>) -> Result<(), AppError>,
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("threshold", &self.threshold)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Steps shipped with this build, in declaration order.
pub const STEPS: &[MigrationStep] = &[
    MigrationStep {
        threshold: SchemaVersion(9),
        name: "add_bank_extras_and_account_alias",
        apply: add_bank_extras_and_account_alias,
    },
    MigrationStep {
        threshold: SchemaVersion(10),
        name: "add_bank_hide_accounts",
        apply: add_bank_hide_accounts,
    },
    MigrationStep {
        threshold: SchemaVersion(11),
        name: "introduce_connection_properties",
        apply: introduce_connection_properties,
    },
    MigrationStep {
        threshold: SchemaVersion(12),
        name: "introduce_connections",
        apply: introduce_connections,
    },
];

// ============================================================================
// Version bookkeeping
// ============================================================================

/// Raw `user_version` of the store. Signed, because SQLite allows any 32-bit value.
pub fn read_version(conn: &Connection) -> Result<i64, AppError> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

pub(crate) fn write_version(conn: &Connection, version: SchemaVersion) -> Result<(), AppError> {
    conn.execute_batch(&format!("PRAGMA user_version = {};", version.0))?;
    Ok(())
}

// ============================================================================
// Runner
// ============================================================================

/// Runs migration steps in threshold order, one transaction per step.
#[derive(Debug, Clone)]
pub struct Migrator {
    steps: Vec<MigrationStep>,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::standard()
    }
}

impl Migrator {
    pub fn standard() -> Self {
        Self::new(STEPS.to_vec())
    }

    /// Steps sharing a threshold keep their relative order.
    pub fn new(mut steps: Vec<MigrationStep>) -> Self {
        steps.sort_by_key(|step| step.threshold);
        Self { steps }
    }

    /// Steps an upgrade from `from` to `to` would run, in order.
    pub fn pending(&self, from: SchemaVersion, to: SchemaVersion) -> Vec<&MigrationStep> {
        self.steps
            .iter()
            .filter(|step| step.threshold >= from && step.threshold < to)
            .collect()
    }

    /// Upgrade the store from `from` to `to` and return the version reached.
    ///
    /// Each step commits on its own. When a step fails its transaction is
    /// rolled back and the error is returned; steps committed before it stay
    /// applied and `user_version` records how far the store got.
    pub fn upgrade(
        &self,
        conn: &mut Connection,
        from: SchemaVersion,
        to: SchemaVersion,
    ) -> Result<SchemaVersion, AppError> {
        if from >= to {
            tracing::debug!(%from, %to, "Store already at target version, nothing to upgrade");
            return Ok(from);
        }

        tracing::warn!(
            %from,
            %to,
            "Upgrading database from version {from} to {to}, which will destroy all old data not carried forward"
        );

        let plan = self.pending(from, to);
        let mut reached = from;

        for (idx, step) in plan.iter().enumerate() {
            // Only the last step of a threshold group moves the version, so a
            // rerun after a failure inside the group repeats the whole group.
            let completes_threshold = plan
                .get(idx + 1)
                .map_or(true, |next| next.threshold != step.threshold);
            let record = completes_threshold.then(|| step.threshold.next());

            run_step(conn, step, record).map_err(|source| {
                tracing::error!(step = step.name, threshold = %step.threshold, error = %source, "Migration step failed");
                AppError::Migration {
                    step: step.name,
                    threshold: step.threshold.0,
                    source: Box::new(source),
                }
            })?;

            if let Some(version) = record {
                reached = version;
            }
            tracing::info!(step = step.name, version = %reached, "Migration step committed");
        }

        if reached < to {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            write_version(&tx, to)?;
            tx.commit()?;
            reached = to;
        }

        tracing::info!(version = %reached, "Database upgrade complete");
        Ok(reached)
    }
}

fn run_step(
    conn: &mut Connection,
    step: &MigrationStep,
    record: Option<SchemaVersion>,
) -> Result<(), AppError> {
    // Dropping `tx` on any early return rolls the step back.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    (step.apply)(&tx)?;
    if let Some(version) = record {
        write_version(&tx, version)?;
    }
    tx.commit()?;
    Ok(())
}

// ============================================================================
// Steps 9 and 10: column additions
// ============================================================================

fn add_bank_extras_and_account_alias(tx: &Transaction<'_>) -> Result<(), AppError> {
    if !has_column(tx, LEGACY_BANK_TABLE, "extras")? {
        tx.execute_batch("ALTER TABLE banks ADD extras text;")?;
        tracing::info!("Added extras column to banks");
    }
    if !has_column(tx, ACCOUNT_TABLE, "aliasfor")? {
        tx.execute_batch("ALTER TABLE accounts ADD aliasfor text;")?;
        tracing::info!("Added aliasfor column to accounts");
    }
    Ok(())
}

fn add_bank_hide_accounts(tx: &Transaction<'_>) -> Result<(), AppError> {
    if !has_column(tx, LEGACY_BANK_TABLE, "hideAccounts")? {
        tx.execute_batch("ALTER TABLE banks ADD hideAccounts integer;")?;
        tracing::info!("Added hideAccounts column to banks");
    }
    Ok(())
}

// ============================================================================
// Step 11: split credentials out of banks into connection_properties
// ============================================================================

const CONNECTION_PROPERTIES_V12: &str = "create table if not exists connection_properties (
    connection_id integer not null,
    property_key text not null,
    property_value text,
    primary key (connection_id, property_key)
);";

/// `banks` without username, password and extras.
const BANKS_V12: &str = "create table banks (
    _id integer primary key autoincrement,
    balance text not null,
    banktype integer not null,
    custname text,
    updated text,
    sortorder integer,
    currency text,
    disabled integer,
    hideAccounts integer
);";

const BANK_COLUMNS_V12: &str =
    "_id, balance, banktype, custname, updated, sortorder, currency, disabled, hideAccounts";

fn introduce_connection_properties(tx: &Transaction<'_>) -> Result<(), AppError> {
    tx.execute_batch(CONNECTION_PROPERTIES_V12)?;

    if !has_column(tx, LEGACY_BANK_TABLE, "username")? {
        tracing::debug!("banks carries no credentials, nothing to split");
        return Ok(());
    }

    // SQLite cannot drop columns everywhere, so rebuild the table instead.
    tx.execute_batch(&format!(
        "ALTER TABLE {LEGACY_BANK_TABLE} RENAME TO {LEGACY_BANK_TEMP_TABLE};
         {BANKS_V12}
         INSERT INTO {LEGACY_BANK_TABLE} ({BANK_COLUMNS_V12})
             SELECT {BANK_COLUMNS_V12} FROM {LEGACY_BANK_TEMP_TABLE};"
    ))?;

    let stats = migrate_properties(tx, LEGACY_BANK_TEMP_TABLE)?;

    tx.execute_batch(&format!("DROP TABLE {LEGACY_BANK_TEMP_TABLE};"))?;

    tracing::info!(
        banks = stats.rows,
        inserted = stats.inserted,
        skipped = stats.skipped,
        "Moved bank credentials into connection_properties"
    );
    Ok(())
}

/// Outcome of a property migration pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PropertyStats {
    pub rows: usize,
    pub inserted: usize,
    pub skipped: usize,
}

/// Copy the credentials of every row of `table` into `connection_properties`.
///
/// Username and password are always written, even when null. Extras only
/// when present and non-empty. A property that cannot be inserted is logged
/// and skipped; reading the source rows is the only fatal failure.
pub fn migrate_properties(conn: &Connection, table: &'static str) -> Result<PropertyStats, AppError> {
    let mut scan = TableScan::<LegacyCredentialRow>::open(conn, table)?;
    let mut insert = conn.prepare(
        "INSERT INTO connection_properties (connection_id, property_key, property_value)
         VALUES (?1, ?2, ?3)",
    )?;

    let mut stats = PropertyStats::default();
    for row in scan.rows()? {
        let row = row?;
        stats.rows += 1;

        let mut properties = vec![
            ConnectionProperty {
                connection_id: row.id,
                key: PropertyKey::Username,
                value: row.username.clone(),
            },
            ConnectionProperty {
                connection_id: row.id,
                key: PropertyKey::Password,
                value: row.password.clone(),
            },
        ];
        if let Some(extras) = row.extras() {
            properties.push(ConnectionProperty {
                connection_id: row.id,
                key: PropertyKey::Extras,
                value: Some(extras.to_string()),
            });
        }

        for property in &properties {
            if insert_property(&mut insert, property) {
                stats.inserted += 1;
            } else {
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

fn insert_property(stmt: &mut Statement<'_>, property: &ConnectionProperty) -> bool {
    match stmt.execute(params![property.connection_id, property.key.as_str(), property.value]) {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(
                connection_id = property.connection_id,
                key = %property.key,
                error = %err,
                "Skipping connection property that could not be inserted"
            );
            false
        }
    }
}

// ============================================================================
// Step 12: banks → connections
// ============================================================================

const CONNECTIONS_V13: &str = "create table if not exists connections (
    id integer primary key,
    provider_id text not null,
    name text,
    enabled integer not null,
    last_updated text,
    sort_order integer
);";

fn introduce_connections(tx: &Transaction<'_>) -> Result<(), AppError> {
    tx.execute_batch(CONNECTIONS_V13)?;

    let mut migrated = 0usize;
    let mut dropped = 0usize;
    {
        let mut scan = TableScan::<LegacyBankRow>::open(tx, LEGACY_BANK_TABLE)?;
        let mut insert = tx.prepare(
            "INSERT INTO connections (id, name, provider_id, enabled, last_updated, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        for row in scan.rows()? {
            let bank = row?;
            let Some(provider_id) = bank.type_code.and_then(legacy_providers::resolve) else {
                // Retired or unreadable bank types have no provider; the bank is dropped.
                tracing::warn!(
                    bank_id = bank.id,
                    legacy_type = ?bank.type_code,
                    "Dropping bank with a retired legacy type"
                );
                dropped += 1;
                continue;
            };
            insert_connection(&mut insert, &bank.into_connection(provider_id))?;
            migrated += 1;
        }
    }

    tx.execute_batch(&format!("DROP TABLE IF EXISTS {LEGACY_BANK_TABLE};"))?;

    tracing::info!(migrated, dropped, "Moved banks into connections");
    Ok(())
}

/// Insert one connection. Unlike properties, any failure here is fatal.
fn insert_connection(stmt: &mut Statement<'_>, connection: &ProviderConnection) -> Result<(), AppError> {
    stmt.execute(params![
        connection.id,
        connection.name,
        connection.provider_id,
        connection.enabled,
        connection.last_updated,
        connection.sort_order,
    ])
    .map_err(|err| match err {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && matches!(
                    failure.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                ) =>
        {
            AppError::DuplicateConnection(connection.id)
        }
        other => AppError::Database(other),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::{legacy_db, LegacyBank};
    use crate::db::schema::{table_exists, SCHEMA_VERSION};

    const VALID: i32 = 1;
    const RETIRED: i32 = 9999;

    fn version(conn: &Connection) -> i64 {
        read_version(conn).unwrap()
    }

    fn connections(conn: &Connection) -> Vec<ProviderConnection> {
        let mut scan = TableScan::<ProviderConnection>::open(conn, "connections").unwrap();
        let rows = scan.rows().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
        rows
    }

    fn properties(conn: &Connection) -> Vec<ConnectionProperty> {
        let mut scan = TableScan::<ConnectionProperty>::open(conn, "connection_properties").unwrap();
        let rows = scan.rows().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
        rows
    }

    fn keys_for(props: &[ConnectionProperty], id: i64) -> Vec<PropertyKey> {
        props.iter().filter(|p| p.connection_id == id).map(|p| p.key).collect()
    }

    fn fail_step(_tx: &Transaction<'_>) -> Result<(), AppError> {
        Err(AppError::Internal("boom".into()))
    }

    fn create_marker(tx: &Transaction<'_>) -> Result<(), AppError> {
        tx.execute_batch("CREATE TABLE IF NOT EXISTS marker (n INTEGER);")?;
        Ok(())
    }

    fn create_marker_then_fail(tx: &Transaction<'_>) -> Result<(), AppError> {
        tx.execute_batch("CREATE TABLE late_marker (n INTEGER);")?;
        Err(AppError::Internal("late boom".into()))
    }

    #[test]
    fn test_pending_selects_thresholds_in_order() {
        let migrator = Migrator::standard();
        let names: Vec<_> = migrator
            .pending(SchemaVersion(10), SCHEMA_VERSION)
            .iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(
            names,
            vec!["add_bank_hide_accounts", "introduce_connection_properties", "introduce_connections"]
        );
        assert!(migrator.pending(SCHEMA_VERSION, SCHEMA_VERSION).is_empty());
        assert_eq!(migrator.pending(SchemaVersion(3), SCHEMA_VERSION).len(), STEPS.len());
    }

    #[test]
    fn test_equal_thresholds_keep_declaration_order() {
        let migrator = Migrator::new(vec![
            MigrationStep { threshold: SchemaVersion(2), name: "b", apply: create_marker },
            MigrationStep { threshold: SchemaVersion(1), name: "a", apply: create_marker },
            MigrationStep { threshold: SchemaVersion(2), name: "c", apply: create_marker },
        ]);
        let names: Vec<_> = migrator
            .pending(SchemaVersion(1), SchemaVersion(5))
            .iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_full_upgrade_from_legacy_store() {
        let mut checking = LegacyBank::new(5, VALID);
        checking.name = Some("Checking".into());
        checking.disabled = Some(1);
        checking.extras = Some(String::new());

        let mut savings = LegacyBank::new(6, 2);
        savings.extras = Some("{\"card\":\"1234\"}".into());
        savings.disabled = None;

        let retired = LegacyBank::new(7, RETIRED);

        let mut conn = legacy_db(10, &[checking, savings, retired]);
        let reached = Migrator::standard()
            .upgrade(&mut conn, SchemaVersion(10), SCHEMA_VERSION)
            .unwrap();
        assert_eq!(reached, SCHEMA_VERSION);
        assert_eq!(version(&conn), 13);

        let conns = connections(&conn);
        assert_eq!(conns.len(), 2);
        assert_eq!(conns[0].id, 5);
        assert_eq!(conns[0].name.as_deref(), Some("Checking"));
        assert_eq!(conns[0].provider_id, "swedbank");
        assert!(!conns[0].enabled);
        assert_eq!(conns[1].id, 6);
        assert_eq!(conns[1].provider_id, "nordea");
        assert!(conns[1].enabled);

        let props = properties(&conn);
        assert_eq!(keys_for(&props, 5), vec![PropertyKey::Username, PropertyKey::Password]);
        assert_eq!(
            keys_for(&props, 6),
            vec![PropertyKey::Username, PropertyKey::Password, PropertyKey::Extras]
        );
        // Properties of the dropped bank survive.
        assert_eq!(keys_for(&props, 7), vec![PropertyKey::Username, PropertyKey::Password]);

        assert!(!table_exists(&conn, LEGACY_BANK_TABLE).unwrap());
        assert!(!table_exists(&conn, LEGACY_BANK_TEMP_TABLE).unwrap());
        let err = conn.prepare("SELECT * FROM banks").unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn test_null_credentials_are_kept_as_is() {
        let mut bank = LegacyBank::new(1, VALID);
        bank.username = None;
        bank.password = Some(String::new());

        let mut conn = legacy_db(11, &[bank]);
        Migrator::standard()
            .upgrade(&mut conn, SchemaVersion(11), SCHEMA_VERSION)
            .unwrap();

        let props = properties(&conn);
        assert_eq!(props.len(), 2);
        assert_eq!(props[0].value, None);
        assert_eq!(props[1].value.as_deref(), Some(""));
    }

    #[test]
    fn test_upgrade_from_version_9_adds_columns() {
        let mut conn = legacy_db(9, &[LegacyBank::new(1, VALID)]);
        Migrator::standard()
            .upgrade(&mut conn, SchemaVersion(9), SchemaVersion(11))
            .unwrap();

        assert_eq!(version(&conn), 11);
        assert!(has_column(&conn, "banks", "extras").unwrap());
        assert!(has_column(&conn, "banks", "hideAccounts").unwrap());
        assert!(has_column(&conn, "accounts", "aliasfor").unwrap());
    }

    #[test]
    fn test_properties_step_rebuilds_banks_without_credentials() {
        let mut conn = legacy_db(11, &[LegacyBank::new(3, VALID)]);
        Migrator::standard()
            .upgrade(&mut conn, SchemaVersion(11), SchemaVersion(12))
            .unwrap();

        assert_eq!(version(&conn), 12);
        assert!(!has_column(&conn, "banks", "username").unwrap());
        assert!(!has_column(&conn, "banks", "password").unwrap());
        assert!(!has_column(&conn, "banks", "extras").unwrap());
        let (name, balance): (String, String) = conn
            .query_row("SELECT custname, balance FROM banks WHERE _id = 3", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(name, "Bank 3");
        assert_eq!(balance, "100.00");
        assert!(!table_exists(&conn, LEGACY_BANK_TEMP_TABLE).unwrap());
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let mut conn = legacy_db(10, &[LegacyBank::new(1, VALID)]);
        let migrator = Migrator::standard();
        let reached = migrator.upgrade(&mut conn, SchemaVersion(10), SCHEMA_VERSION).unwrap();

        let before = (connections(&conn), properties(&conn));
        let again = migrator.upgrade(&mut conn, reached, SCHEMA_VERSION).unwrap();
        assert_eq!(again, SCHEMA_VERSION);
        assert_eq!(before, (connections(&conn), properties(&conn)));
    }

    #[test]
    fn test_steps_are_idempotent_when_replayed() {
        let mut conn = legacy_db(10, &[LegacyBank::new(1, VALID)]);
        Migrator::standard()
            .upgrade(&mut conn, SchemaVersion(10), SchemaVersion(12))
            .unwrap();

        // Pretend the version write was lost and replay step 11 and 12 from scratch.
        write_version(&conn, SchemaVersion(11)).unwrap();
        Migrator::standard()
            .upgrade(&mut conn, SchemaVersion(11), SCHEMA_VERSION)
            .unwrap();

        assert_eq!(connections(&conn).len(), 1);
        assert_eq!(properties(&conn).len(), 2);
    }

    #[test]
    fn test_duplicate_connection_aborts_step_and_rolls_back() {
        let mut conn = legacy_db(11, &[LegacyBank::new(5, VALID), LegacyBank::new(6, VALID)]);
        let migrator = Migrator::standard();
        migrator.upgrade(&mut conn, SchemaVersion(11), SchemaVersion(12)).unwrap();

        conn.execute_batch(
            "CREATE TABLE connections (id integer primary key, provider_id text not null,
                 name text, enabled integer not null, last_updated text, sort_order integer);
             INSERT INTO connections (id, provider_id, enabled) VALUES (6, 'existing', 1);",
        )
        .unwrap();

        let err = migrator
            .upgrade(&mut conn, SchemaVersion(12), SCHEMA_VERSION)
            .unwrap_err();
        match err {
            AppError::Migration { step, threshold, source } => {
                assert_eq!(step, "introduce_connections");
                assert_eq!(threshold, 12);
                assert!(matches!(*source, AppError::DuplicateConnection(6)));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Step 12 rolled back: banks still there, only the pre-existing row in connections.
        assert_eq!(version(&conn), 12);
        assert!(table_exists(&conn, LEGACY_BANK_TABLE).unwrap());
        let conns = connections(&conn);
        assert_eq!(conns.len(), 1);
        assert_eq!(conns[0].provider_id, "existing");
    }

    #[test]
    fn test_unreadable_type_codes_are_dropped_not_fatal() {
        for stored in ["5000000000", "'retired'"] {
            let mut conn = legacy_db(11, &[LegacyBank::new(1, VALID), LegacyBank::new(2, VALID)]);
            conn.execute_batch(&format!("UPDATE banks SET banktype = {stored} WHERE _id = 2;"))
                .unwrap();

            let reached = Migrator::standard()
                .upgrade(&mut conn, SchemaVersion(11), SCHEMA_VERSION)
                .unwrap();
            assert_eq!(reached, SCHEMA_VERSION);

            let conns = connections(&conn);
            assert_eq!(conns.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1], "banktype {stored}");
            assert!(!table_exists(&conn, LEGACY_BANK_TABLE).unwrap());
            // Properties of the dropped bank survive the properties step.
            assert_eq!(keys_for(&properties(&conn), 2).len(), 2);
        }
    }

    #[test]
    fn test_property_insert_failure_is_not_fatal() {
        let mut conn = legacy_db(11, &[LegacyBank::new(5, VALID), LegacyBank::new(6, VALID)]);
        conn.execute_batch(
            "CREATE TABLE connection_properties (connection_id integer not null,
                 property_key text not null, property_value text,
                 primary key (connection_id, property_key));
             INSERT INTO connection_properties VALUES (5, 'username', 'already-there');",
        )
        .unwrap();

        Migrator::standard()
            .upgrade(&mut conn, SchemaVersion(11), SCHEMA_VERSION)
            .unwrap();

        let props = properties(&conn);
        assert_eq!(props.len(), 4);
        let username_5 = props
            .iter()
            .find(|p| p.connection_id == 5 && p.key == PropertyKey::Username)
            .unwrap();
        assert_eq!(username_5.value.as_deref(), Some("already-there"));
    }

    #[test]
    fn test_migrate_properties_reports_counts() {
        let mut with_extras = LegacyBank::new(2, VALID);
        with_extras.extras = Some("x".into());
        let conn = legacy_db(11, &[LegacyBank::new(1, VALID), with_extras]);
        conn.execute_batch(CONNECTION_PROPERTIES_V12).unwrap();

        let stats = migrate_properties(&conn, "banks").unwrap();
        assert_eq!(stats, PropertyStats { rows: 2, inserted: 5, skipped: 0 });

        let again = migrate_properties(&conn, "banks").unwrap();
        assert_eq!(again, PropertyStats { rows: 2, inserted: 0, skipped: 5 });
    }

    #[test]
    fn test_failed_step_leaves_intermediate_version() {
        let migrator = Migrator::new(vec![
            MigrationStep { threshold: SchemaVersion(1), name: "marker", apply: create_marker },
            MigrationStep { threshold: SchemaVersion(2), name: "late", apply: create_marker_then_fail },
            MigrationStep { threshold: SchemaVersion(3), name: "never", apply: fail_step },
        ]);
        let mut conn = Connection::open_in_memory().unwrap();
        write_version(&conn, SchemaVersion(1)).unwrap();

        let err = migrator
            .upgrade(&mut conn, SchemaVersion(1), SchemaVersion(4))
            .unwrap_err();
        assert!(matches!(err, AppError::Migration { step: "late", threshold: 2, .. }));
        assert_eq!(version(&conn), 2);
        assert!(table_exists(&conn, "marker").unwrap());
        assert!(!table_exists(&conn, "late_marker").unwrap());
    }

    #[test]
    fn test_failure_inside_threshold_group_keeps_version() {
        let migrator = Migrator::new(vec![
            MigrationStep { threshold: SchemaVersion(4), name: "first", apply: create_marker },
            MigrationStep { threshold: SchemaVersion(4), name: "second", apply: fail_step },
        ]);
        let mut conn = Connection::open_in_memory().unwrap();
        write_version(&conn, SchemaVersion(4)).unwrap();

        assert!(migrator.upgrade(&mut conn, SchemaVersion(4), SchemaVersion(5)).is_err());
        assert_eq!(version(&conn), 4);
        assert!(table_exists(&conn, "marker").unwrap());
    }

    #[test]
    fn test_version_bumped_to_target_past_last_step() {
        let migrator = Migrator::new(vec![MigrationStep {
            threshold: SchemaVersion(1),
            name: "marker",
            apply: create_marker,
        }]);
        let mut conn = Connection::open_in_memory().unwrap();
        let reached = migrator.upgrade(&mut conn, SchemaVersion(1), SchemaVersion(6)).unwrap();
        assert_eq!(reached, SchemaVersion(6));
        assert_eq!(version(&conn), 6);
    }

    #[test]
    fn test_downward_or_equal_span_does_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        let migrator = Migrator::new(vec![MigrationStep {
            threshold: SchemaVersion(0),
            name: "never",
            apply: fail_step,
        }]);
        assert_eq!(
            migrator.upgrade(&mut conn, SchemaVersion(5), SchemaVersion(5)).unwrap(),
            SchemaVersion(5)
        );
        assert_eq!(
            migrator.upgrade(&mut conn, SchemaVersion(7), SchemaVersion(5)).unwrap(),
            SchemaVersion(7)
        );
        assert_eq!(version(&conn), 0);
    }
}
