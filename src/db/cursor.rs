//! Typed, single-pass reads over a whole table.
//!
//! Migration steps read rows of a table whose layout is about to change, so
//! each read names its columns explicitly instead of relying on `SELECT *`
//! and on the destination schema.

use std::marker::PhantomData;

use rusqlite::{Connection, Row, Rows, Statement};

use crate::db::schema::table_exists;
use crate::error::AppError;

/// A record that can be built from a row selecting `COLUMNS` in order.
pub trait FromRow: Sized {
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// A prepared full-table read. Owns the statement; dropping the scan
/// releases it whether or not the rows were consumed.
pub struct TableScan<'conn, T> {
    table: &'static str,
    stmt: Option<Statement<'conn>>,
    consumed: bool,
    _row: PhantomData<fn() -> T>,
}

impl<'conn, T: FromRow> TableScan<'conn, T> {
    /// Prepare a scan of `table`. A missing table yields a scan with no rows.
    pub fn open(conn: &'conn Connection, table: &'static str) -> Result<Self, AppError> {
        let stmt = if table_exists(conn, table)? {
            let sql = format!("SELECT {} FROM {table} ORDER BY rowid", T::COLUMNS.join(", "));
            Some(conn.prepare(&sql)?)
        } else {
            tracing::debug!(table, "Table not present, scanning nothing");
            None
        };

        Ok(Self {
            table,
            stmt,
            consumed: false,
            _row: PhantomData,
        })
    }

    /// Start streaming rows. The scan is single-pass: every call after the
    /// first returns an empty stream.
    pub fn rows(&mut self) -> Result<RowStream<'_, T>, AppError> {
        if self.consumed {
            return Ok(RowStream::empty());
        }
        self.consumed = true;

        let Some(stmt) = self.stmt.as_mut() else {
            return Ok(RowStream::empty());
        };
        tracing::debug!(table = self.table, "Scanning table");
        let rows = stmt.query([])?;
        Ok(RowStream {
            rows: Some(rows),
            _row: PhantomData,
        })
    }
}

/// Lazy, forward-only rows of a [`TableScan`]. Fused: after the last row
/// or the first error it keeps returning `None`.
pub struct RowStream<'stmt, T> {
    rows: Option<Rows<'stmt>>,
    _row: PhantomData<fn() -> T>,
}

impl<T> RowStream<'_, T> {
    fn empty() -> Self {
        Self {
            rows: None,
            _row: PhantomData,
        }
    }
}

impl<T: FromRow> Iterator for RowStream<'_, T> {
    type Item = Result<T, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rows = self.rows.as_mut()?;
        let fetched = match rows.next() {
            Ok(Some(row)) => Some(T::from_row(row)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        };

        match fetched {
            Some(Ok(value)) => Some(Ok(value)),
            Some(Err(err)) => {
                self.rows = None;
                Some(Err(AppError::Database(err)))
            }
            None => {
                self.rows = None;
                None
            }
        }
    }
}
