//! Live schema introspection.
//!
//! An [`Introspector`] answers metadata questions through a [`Connection`].
//! Every call queries the database again; nothing is cached between calls.
//! Lookup failures surface as [`UpgradeError::Introspection`], never as a
//! silent "does not exist".

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, UpgradeError};
use crate::model::LiveColumn;
use crate::port::{Connection, Row, Value};

/// Dialect-specific metadata lookups.
pub trait Introspector: Send + Sync {
    /// Dialect name, matching the paired [`Generator`](crate::Generator).
    fn dialect(&self) -> &str;

    /// Returns `true` if `table` exists.
    fn table_exists(&self, conn: &mut dyn Connection, table: &str) -> Result<bool>;

    /// Returns the table's columns in native order when the engine reports one.
    fn columns(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<LiveColumn>>;

    /// Returns the names of the table's indexes.
    fn indexes(&self, conn: &mut dyn Connection, table: &str) -> Result<BTreeSet<String>>;
}

/// Keys introspected columns by name. Diffing only ever goes through this
/// map, so the engine's column order never matters.
pub fn live_column_map(columns: Vec<LiveColumn>) -> BTreeMap<String, LiveColumn> {
    columns.into_iter().map(|c| (c.name.clone(), c)).collect()
}

/// Runs a metadata query, attaching `table` to any failure.
pub(crate) fn query_rows(
    conn: &mut dyn Connection,
    table: &str,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Row>> {
    conn.query(sql, params)
        .map_err(|source| UpgradeError::introspection(table, source))
}

/// Reads the first column of the first row as a count.
pub(crate) fn count_rows(
    conn: &mut dyn Connection,
    table: &str,
    sql: &str,
    params: &[Value],
) -> Result<i64> {
    let rows = query_rows(conn, table, sql, params)?;
    rows.first()
        .and_then(|row| row.get_index(0))
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            UpgradeError::introspection(table, "metadata query returned no count".into())
        })
}

/// Reads a required text column from a metadata row.
pub(crate) fn required_str<'r>(row: &'r Row, table: &str, column: &str) -> Result<&'r str> {
    row.get_str(column).ok_or_else(|| {
        UpgradeError::introspection(
            table,
            format!("metadata row is missing '{column}'").into(),
        )
    })
}
