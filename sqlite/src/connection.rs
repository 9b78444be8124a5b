//! [`Connection`] port over `rusqlite`.
//!
//! Statements are prepared one at a time; nothing is ever run through
//! `execute_batch` except the fixed transaction and pragma statements.

use std::path::Path;
use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{InterruptHandle, params_from_iter};
use schema_upgrade_core::{Connection, PortError, Row, SqliteSettings, Value};

use crate::error::Result;

/// Connection settings applied when a database is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self::from(&SqliteSettings::default())
    }
}

impl From<&SqliteSettings> for SqliteOptions {
    fn from(settings: &SqliteSettings) -> Self {
        Self {
            busy_timeout: Duration::from_millis(settings.busy_timeout_ms),
            foreign_keys: settings.foreign_keys,
        }
    }
}

/// A `rusqlite` connection usable by the upgrader.
///
/// # Examples
///
/// ```
/// use schema_upgrade_core::{Connection, Value};
/// use schema_upgrade_sqlite::{SqliteConnection, SqliteOptions};
///
/// let mut conn = SqliteConnection::open_in_memory(&SqliteOptions::default()).unwrap();
/// conn.execute("CREATE TABLE t (id INTEGER)", &[]).unwrap();
/// conn.execute("INSERT INTO t (id) VALUES (?1)", &[Value::Integer(7)]).unwrap();
///
/// let rows = conn.query("SELECT id FROM t", &[]).unwrap();
/// assert_eq!(rows[0].get_i64("id"), Some(7));
/// ```
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Wraps an existing connection without changing its settings.
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Wraps `conn` after applying `options`.
    pub fn with_options(conn: rusqlite::Connection, options: &SqliteOptions) -> Result<Self> {
        conn.busy_timeout(options.busy_timeout)?;
        let pragma = if options.foreign_keys {
            "PRAGMA foreign_keys = ON;"
        } else {
            "PRAGMA foreign_keys = OFF;"
        };
        conn.execute_batch(pragma)?;
        Ok(Self { conn })
    }

    pub fn open(path: impl AsRef<Path>, options: &SqliteOptions) -> Result<Self> {
        Self::with_options(rusqlite::Connection::open(path)?, options)
    }

    pub fn open_in_memory(options: &SqliteOptions) -> Result<Self> {
        Self::with_options(rusqlite::Connection::open_in_memory()?, options)
    }

    /// Returns a handle that aborts the statement currently running on this
    /// connection, from any thread.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Consumes the wrapper and returns the underlying connection.
    pub fn into_inner(self) -> rusqlite::Connection {
        self.conn
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[Value]) -> std::result::Result<u64, PortError> {
        let mut stmt = self.conn.prepare(sql)?;
        let changed = stmt.execute(params_from_iter(params.iter().map(to_sql)))?;
        Ok(changed as u64)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> std::result::Result<Vec<Row>, PortError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..columns.len())
                .map(|i| row.get_ref(i).map(from_sql))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }

    fn begin(&mut self) -> std::result::Result<(), PortError> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> std::result::Result<(), PortError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> std::result::Result<(), PortError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> SqliteConnection {
        SqliteConnection::open_in_memory(&SqliteOptions::default()).unwrap()
    }

    #[test]
    fn test_values_round_trip_through_sqlite() {
        let mut conn = conn();
        conn.execute("CREATE TABLE t (i INTEGER, r REAL, s TEXT, b BLOB, n TEXT)", &[])
            .unwrap();
        conn.execute(
            "INSERT INTO t VALUES (?1, ?2, ?3, ?4, ?5)",
            &[
                Value::Integer(1),
                Value::Real(1.5),
                Value::from("x"),
                Value::Blob(vec![0, 1]),
                Value::Null,
            ],
        )
        .unwrap();

        let rows = conn.query("SELECT * FROM t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("i"), Some(&Value::Integer(1)));
        assert_eq!(rows[0].get("r"), Some(&Value::Real(1.5)));
        assert_eq!(rows[0].get_str("s"), Some("x"));
        assert_eq!(rows[0].get("b"), Some(&Value::Blob(vec![0, 1])));
        assert!(rows[0].get("n").is_some_and(Value::is_null));
    }

    #[test]
    fn test_rollback_discards_statements() {
        let mut conn = conn();
        conn.begin().unwrap();
        conn.execute("CREATE TABLE t (id INTEGER)", &[]).unwrap();
        conn.rollback().unwrap();

        let rows = conn
            .query("SELECT COUNT(*) FROM sqlite_master WHERE name = 't'", &[])
            .unwrap();
        assert_eq!(rows[0].get_index(0), Some(&Value::Integer(0)));
    }

    #[test]
    fn test_options_apply_pragmas() {
        let options = SqliteOptions {
            busy_timeout: Duration::from_millis(100),
            foreign_keys: false,
        };
        let mut conn = SqliteConnection::open_in_memory(&options).unwrap();
        let rows = conn.query("PRAGMA foreign_keys", &[]).unwrap();
        assert_eq!(rows[0].get_index(0), Some(&Value::Integer(0)));

        let mut conn = SqliteConnection::open_in_memory(&SqliteOptions::default()).unwrap();
        let rows = conn.query("PRAGMA foreign_keys", &[]).unwrap();
        assert_eq!(rows[0].get_index(0), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_errors_surface_as_port_errors() {
        let mut conn = conn();
        let err = conn.execute("ALTER TABLE missing ADD COLUMN x TEXT", &[]).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
