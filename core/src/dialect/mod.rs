//! Built-in dialects.
//!
//! Each dialect module pairs a configured [`Generator`] with an
//! [`Introspector`] that reads that engine's catalog:
//!
//! - [`sqlite`]: embedded file database; no native timestamp or JSON types,
//!   cannot add a primary key to an existing table.
//! - [`postgres`]: `information_schema` and `pg_indexes` introspection,
//!   `JSONB`/`BYTEA` types.
//! - [`mysql`]: backtick quoting, InnoDB tables, DDL is not transactional.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::generator::Generator;
use crate::introspect::Introspector;

/// Selects one of the built-in dialects by name.
///
/// # Examples
///
/// ```
/// use schema_upgrade_core::Dialect;
///
/// let dialect: Dialect = "postgresql".parse().unwrap();
/// assert_eq!(dialect, Dialect::Postgres);
/// assert_eq!(dialect.generator().dialect(), "postgres");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    #[serde(alias = "postgresql")]
    Postgres,
    #[serde(alias = "mariadb")]
    Mysql,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqlite => sqlite::NAME,
            Self::Postgres => postgres::NAME,
            Self::Mysql => mysql::NAME,
        }
    }

    pub fn generator(&self) -> Generator {
        match self {
            Self::Sqlite => sqlite::generator(),
            Self::Postgres => postgres::generator(),
            Self::Mysql => mysql::generator(),
        }
    }

    pub fn introspector(&self) -> Box<dyn Introspector> {
        match self {
            Self::Sqlite => Box::new(sqlite::SqliteIntrospector),
            Self::Postgres => Box::new(postgres::PostgresIntrospector),
            Self::Mysql => Box::new(mysql::MysqlIntrospector),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown dialect name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dialect '{0}' (expected sqlite, postgres or mysql)")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            _ => Err(UnknownDialect(raw.to_string())),
        }
    }
}
