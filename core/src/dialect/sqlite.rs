//! SQLite dialect.
//!
//! SQLite has no native timestamp, JSON or fixed-point type, so those kinds
//! are intercepted in the type map. Existing tables cannot gain a primary key
//! through `ALTER TABLE`; that capability is switched off and the upgrader
//! fails fast instead of rebuilding the table.
//!
//! Introspection reads `sqlite_master` and the `table_info` pragma.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::generator::{Generator, TypeMap, TypeOverride};
use crate::introspect::{Introspector, count_rows, query_rows, required_str};
use crate::model::{ColumnKind, LiveColumn};
use crate::port::{Connection, Value};

pub const NAME: &str = "sqlite";

/// Returns the SQLite generator.
pub fn generator() -> Generator {
    let types = TypeMap::new()
        .with_override(ColumnKind::Timestamp, TypeOverride::Fixed("TIMESTAMP"))
        .with_override(ColumnKind::Binary, TypeOverride::Fixed("BLOB"))
        .with_override(ColumnKind::Json, TypeOverride::Fixed("TEXT"))
        .with_override(ColumnKind::Decimal, TypeOverride::Fixed("NUMERIC"));

    Generator::new(NAME)
        .with_types(types)
        .without_add_primary_key()
}

/// Reads SQLite's catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteIntrospector;

impl Introspector for SqliteIntrospector {
    fn dialect(&self) -> &str {
        NAME
    }

    fn table_exists(&self, conn: &mut dyn Connection, table: &str) -> Result<bool> {
        let count = count_rows(
            conn,
            table,
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[Value::from(table)],
        )?;
        Ok(count > 0)
    }

    fn columns(&self, conn: &mut dyn Connection, table: &str) -> Result<Vec<LiveColumn>> {
        // Pragmas do not take bound parameters.
        let sql = format!("PRAGMA table_info({})", generator().quote_ident(table));
        let rows = query_rows(conn, table, &sql, &[])?;

        rows.iter()
            .map(|row| {
                Ok(LiveColumn {
                    name: required_str(row, table, "name")?.to_string(),
                    nullable: !row.get_bool("notnull").unwrap_or(false),
                    raw_type: row.get_str("type").unwrap_or_default().to_string(),
                    has_default: row.get("dflt_value").is_some_and(|v| !v.is_null()),
                    primary_key: row.get_i64("pk").unwrap_or(0) > 0,
                })
            })
            .collect()
    }

    fn indexes(&self, conn: &mut dyn Connection, table: &str) -> Result<BTreeSet<String>> {
        let rows = query_rows(
            conn,
            table,
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1",
            &[Value::from(table)],
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get_str("name").map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, ColumnType, Table};
    use crate::port::Row;
    use crate::testing::{ScriptedConnection, count_row};

    #[test]
    fn test_type_overrides() {
        let generator = generator();
        assert_eq!(
            generator.column_type(&ColumnType::Timestamp { timezone: true }),
            "TIMESTAMP"
        );
        assert_eq!(generator.column_type(&ColumnType::Binary), "BLOB");
        assert_eq!(generator.column_type(&ColumnType::Json), "TEXT");
        assert_eq!(
            generator.column_type(&ColumnType::Decimal {
                precision: 10,
                scale: 2
            }),
            "NUMERIC"
        );
        assert_eq!(generator.column_type(&ColumnType::Identifier), "BIGINT");
    }

    #[test]
    fn test_create_table_with_timestamp_substitute() {
        let table = Table::new("sessions")
            .column(Column::new("id", ColumnType::Identifier))
            .column(Column::new("expires_at", ColumnType::Timestamp { timezone: true }))
            .primary_key(["id"]);
        assert_eq!(
            generator().create_table(&table),
            "CREATE TABLE \"sessions\" (\n    \"id\" BIGINT NOT NULL,\n    \"expires_at\" TIMESTAMP NOT NULL,\n    PRIMARY KEY (\"id\")\n)"
        );
    }

    #[test]
    fn test_cannot_add_primary_key() {
        assert!(!generator().supports_add_primary_key());
        assert!(generator().transactional_ddl());
    }

    #[test]
    fn test_table_exists_binds_name() {
        let mut conn = ScriptedConnection::new().respond("sqlite_master", count_row(1));
        assert!(SqliteIntrospector.table_exists(&mut conn, "users").unwrap());
        assert_eq!(conn.queries[0].1, vec![Value::from("users")]);
    }

    #[test]
    fn test_columns_from_table_info() {
        let rows = vec![
            Row::from_pairs([
                ("cid", Value::Integer(0)),
                ("name", Value::from("id")),
                ("type", Value::from("BIGINT")),
                ("notnull", Value::Integer(1)),
                ("dflt_value", Value::Null),
                ("pk", Value::Integer(1)),
            ]),
            Row::from_pairs([
                ("cid", Value::Integer(1)),
                ("name", Value::from("email")),
                ("type", Value::from("TEXT")),
                ("notnull", Value::Integer(0)),
                ("dflt_value", Value::from("''")),
                ("pk", Value::Integer(0)),
            ]),
        ];
        let mut conn = ScriptedConnection::new().respond("PRAGMA table_info", rows);

        let columns = SqliteIntrospector.columns(&mut conn, "users").unwrap();
        assert_eq!(conn.queries[0].0, "PRAGMA table_info(\"users\")");
        assert_eq!(columns.len(), 2);
        assert!(columns[0].primary_key && !columns[0].nullable && !columns[0].has_default);
        assert!(!columns[1].primary_key && columns[1].nullable && columns[1].has_default);
        assert_eq!(columns[1].raw_type, "TEXT");
    }

    #[test]
    fn test_introspection_failure_is_surfaced() {
        let mut conn = ScriptedConnection::new().fail_on("sqlite_master");
        let err = SqliteIntrospector.table_exists(&mut conn, "users").unwrap_err();
        assert_eq!(err.table(), Some("users"));
    }
}
