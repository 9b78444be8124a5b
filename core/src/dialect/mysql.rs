//! MySQL/MariaDB dialect.
//!
//! Backtick quoting, InnoDB tables with `utf8mb4`. MySQL commits implicitly
//! around every DDL statement, so steps for one table run sequentially and a
//! failure part-way leaves the earlier statements applied.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::generator::{Generator, QuoteStyle, TypeMap, TypeOverride};
use crate::introspect::{Introspector, count_rows, query_rows, required_str};
use crate::model::{ColumnKind, LiveColumn};
use crate::port::{Connection, Value};

pub const NAME: &str = "mysql";

const TABLE_OPTIONS: &str = "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

/// Longest `utf8mb4` prefix that fits InnoDB's 767-byte index key limit.
const INDEX_PREFIX: u32 = 191;

const TABLE_EXISTS_SQL: &str = "SELECT COUNT(*) FROM information_schema.tables \
     WHERE table_schema = DATABASE() AND table_name = ?";

const COLUMNS_SQL: &str = "SELECT column_name AS column_name, is_nullable AS is_nullable, \
     column_type AS column_type, column_default AS column_default, column_key AS column_key \
     FROM information_schema.columns \
     WHERE table_schema = DATABASE() AND table_name = ? \
     ORDER BY ordinal_position";

const INDEXES_SQL: &str = "SELECT DISTINCT index_name AS index_name \
     FROM information_schema.statistics \
     WHERE table_schema = DATABASE() AND table_name = ?";

/// Returns the MySQL generator.
pub fn generator() -> Generator {
    let types = TypeMap::new()
        .with_override(ColumnKind::Identifier, TypeOverride::Fixed("BIGINT UNSIGNED"))
        .with_override(ColumnKind::Boolean, TypeOverride::Fixed("TINYINT(1)"))
        .with_override(ColumnKind::Binary, TypeOverride::Fixed("LONGBLOB"))
        .with_override(ColumnKind::Timestamp, TypeOverride::Fixed("DATETIME"));

    Generator::new(NAME)
        .with_quote_style(QuoteStyle::Backtick)
        .with_types(types)
        .with_table_options(TABLE_OPTIONS)
        .with_transactional_ddl(false)
        .with_index_prefix(INDEX_PREFIX)
}

/// Reads MySQL's `information_schema` for the connection's current database.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlIntrospector;

impl Introspector for MysqlIntrospector {
    fn dialect(&self) -> &str {
        NAME
    }

    fn table_exists(&self, conn: &mut dyn Connection, table: &str) -> Result<bool> {
        Ok(count_rows(conn, table, TABLE_EXISTS_SQL, &[Value::from(table)])? > 0)
    }

    fn columns(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<LiveColumn>> {
        let rows = query_rows(conn, table, COLUMNS_SQL, &[Value::from(table)])?;

        rows.iter()
            .map(|row| {
                Ok(LiveColumn {
                    name: required_str(row, table, "column_name")?.to_string(),
                    nullable: row.get_bool("is_nullable").unwrap_or(true),
                    raw_type: row.get_str("column_type").unwrap_or_default().to_string(),
                    has_default: row.get("column_default").is_some_and(|v| !v.is_null()),
                    primary_key: row.get_str("column_key") == Some("PRI"),
                })
            })
            .collect()
    }

    fn indexes(&self, conn: &mut dyn Connection, table: &str) -> Result<BTreeSet<String>> {
        let rows = query_rows(conn, table, INDEXES_SQL, &[Value::from(table)])?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get_str("index_name").map(str::to_string))
            .collect())
    }
}
