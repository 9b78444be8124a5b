//! Execution and query ports consumed by the upgrader.
//!
//! The engine never talks to a driver directly. A [`Connection`] runs one
//! parameterized statement at a time and returns rows for metadata queries;
//! the SQLite crate provides one over `rusqlite`, and tests provide fakes.

use crate::error::PortError;

/// A bound parameter or a value read back from a metadata query.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interprets integers and the usual textual spellings as booleans.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Integer(v) => Some(*v != 0),
            Self::Text(s) => match s.trim().to_ascii_uppercase().as_str() {
                "YES" | "TRUE" | "T" | "1" => Some(true),
                "NO" | "FALSE" | "F" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => b.into(),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Real(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Text(other.to_string()),
        }
    }
}

/// One row returned by [`Connection::query`], addressable by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Builds a row from `(column, value)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let (columns, values) = pairs.into_iter().map(|(c, v)| (c.into(), v)).unzip();
        Self { columns, values }
    }

    /// Returns the value of `column`, matched case-insensitively.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    /// Returns the value at `index`.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(Value::as_bool)
    }
}

/// A live database handle: single-statement execution plus metadata queries.
///
/// Implementations must never split or batch statements. The transaction
/// methods default to no-ops for engines without transactional DDL.
pub trait Connection {
    /// Executes one statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, PortError>;

    /// Runs one query and collects its rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, PortError>;

    fn begin(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), PortError> {
        Ok(())
    }
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, PortError> {
        (**self).execute(sql, params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, PortError> {
        (**self).query(sql, params)
    }

    fn begin(&mut self) -> Result<(), PortError> {
        (**self).begin()
    }

    fn commit(&mut self) -> Result<(), PortError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), PortError> {
        (**self).rollback()
    }
}
