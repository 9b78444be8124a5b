//! PostgreSQL dialect.
//!
//! Uses the default type mapping apart from `JSONB` and `BYTEA`. All lookups
//! are scoped to `current_schema()`, so tables resolve the same way the
//! connection's `search_path` resolves the generated DDL.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::generator::{Generator, TypeMap, TypeOverride};
use crate::introspect::{Introspector, count_rows, query_rows, required_str};
use crate::model::{ColumnKind, LiveColumn};
use crate::port::{Connection, Value};

pub const NAME: &str = "postgres";

const TABLE_EXISTS_SQL: &str = "SELECT COUNT(*) FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = $1";

const COLUMNS_SQL: &str = r#"
SELECT c.column_name, c.is_nullable, c.data_type, c.column_default,
       CASE WHEN k.column_name IS NULL THEN 0 ELSE 1 END AS primary_key
FROM information_schema.columns c
LEFT JOIN (
    SELECT kcu.column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
     AND tc.table_name = kcu.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
      AND tc.table_schema = current_schema()
      AND tc.table_name = $1
) k ON k.column_name = c.column_name
WHERE c.table_schema = current_schema() AND c.table_name = $1
ORDER BY c.ordinal_position
"#;

const INDEXES_SQL: &str =
    "SELECT indexname FROM pg_indexes WHERE schemaname = current_schema() AND tablename = $1";

/// Returns the PostgreSQL generator.
pub fn generator() -> Generator {
    let types = TypeMap::new()
        .with_override(ColumnKind::Json, TypeOverride::Fixed("JSONB"))
        .with_override(ColumnKind::Binary, TypeOverride::Fixed("BYTEA"));

    Generator::new(NAME)
        .with_types(types)
        .with_numbered_placeholders()
}

/// Reads PostgreSQL's `information_schema` and `pg_indexes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresIntrospector;

impl Introspector for PostgresIntrospector {
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
                    raw_type: row.get_str("data_type").unwrap_or_default().to_string(),
                    has_default: row.get("column_default").is_some_and(|v| !v.is_null()),
                    primary_key: row.get_bool("primary_key").unwrap_or(false),
                })
            })
            .collect()
    }

    fn indexes(&self, conn: &mut dyn Connection, table: &str) -> Result<BTreeSet<String>> {
        let rows = query_rows(conn, table, INDEXES_SQL, &[Value::from(table)])?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get_str("indexname").map(str::to_string))
            .collect())
    }
}
