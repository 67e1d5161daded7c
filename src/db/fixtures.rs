//! Legacy store layouts for tests.

use rusqlite::{params, Connection};

const BANKS_V9: &str = "create table banks (
    _id integer primary key autoincrement,
    balance text not null,
    banktype integer not null,
    username text,
    password text,
    custname text,
    updated text,
    sortorder integer,
    currency text,
    disabled integer
);";

const ACCOUNTS_V9: &str = "create table accounts (
    _id integer primary key autoincrement,
    balance text not null,
    acctype integer not null,
    name text not null,
    bankid integer not null,
    id text not null,
    hidden integer,
    notify integer,
    currency text
);";

const TRANSACTIONS_V9: &str = "create table transactions (
    _id integer primary key autoincrement,
    transdate text not null,
    btransaction text not null,
    amount text not null,
    account text not null,
    currency text
);";

/// A row of the legacy `banks` table.
#[derive(Debug, Clone)]
pub struct LegacyBank {
    pub id: i64,
    pub name: Option<String>,
    pub type_code: i32,
    pub username: Option<String>,
    pub password: Option<String>,
    pub extras: Option<String>,
    pub disabled: Option<i64>,
    pub updated: Option<String>,
    pub sort_order: Option<i64>,
}

impl LegacyBank {
    pub fn new(id: i64, type_code: i32) -> Self {
        Self {
            id,
            name: Some(format!("Bank {id}")),
            type_code,
            username: Some(format!("user{id}")),
            password: Some(format!("secret{id}")),
            extras: None,
            disabled: Some(0),
            updated: Some("2015-06-01 10:00".into()),
            sort_order: Some(id),
        }
    }
}

/// Create the legacy layout as it looked at `version` (9, 10 or 11).
pub fn create_legacy_schema(conn: &Connection, version: u32) {
    conn.execute_batch(BANKS_V9).unwrap();
    conn.execute_batch(ACCOUNTS_V9).unwrap();
    conn.execute_batch(TRANSACTIONS_V9).unwrap();
    if version >= 10 {
        conn.execute_batch(
            "ALTER TABLE banks ADD extras text;
             ALTER TABLE accounts ADD aliasfor text;",
        )
        .unwrap();
    }
    if version >= 11 {
        conn.execute_batch("ALTER TABLE banks ADD hideAccounts integer;").unwrap();
    }
    conn.execute_batch(&format!("PRAGMA user_version = {version};")).unwrap();
}

/// Insert legacy banks. `extras` is only written when the layout has the column.
pub fn insert_banks(conn: &Connection, banks: &[LegacyBank]) {
    let has_extras: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('banks') WHERE name = 'extras'",
            [],
            |row| row.get(0),
        )
        .unwrap();

    for bank in banks {
        conn.execute(
            "INSERT INTO banks (_id, balance, banktype, username, password, custname,
                                updated, sortorder, currency, disabled)
             VALUES (?1, '100.00', ?2, ?3, ?4, ?5, ?6, ?7, 'SEK', ?8)",
            params![
                bank.id,
                bank.type_code,
                bank.username,
                bank.password,
                bank.name,
                bank.updated,
                bank.sort_order,
                bank.disabled,
            ],
        )
        .unwrap();
        if has_extras {
            conn.execute(
                "UPDATE banks SET extras = ?1 WHERE _id = ?2",
                params![bank.extras, bank.id],
            )
            .unwrap();
        }
    }
}

/// A legacy store at `version` holding `banks`.
pub fn legacy_db(version: u32, banks: &[LegacyBank]) -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    create_legacy_schema(&conn, version);
    insert_banks(&conn, banks);
    conn
}
