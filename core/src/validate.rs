//! Desired-schema validation.
//!
//! Catches structural mistakes in a schema before it reaches a database:
//! malformed or duplicate names, indexes and primary keys over columns the
//! table does not declare, and indexes attached to the wrong table.
//!
//! The upgrader does not call this itself; callers validate once when they
//! load or build a schema.
//!
//! # Examples
//!
//! ```
//! use schema_upgrade_core::*;
//!
//! let users = Table::new("users")
//!     .column(Column::new("id", ColumnType::Identifier))
//!     .primary_key(["id"]);
//! assert!(validate_schema(&[users]).is_empty());
//!
//! // Index over a column the table does not declare
//! let bad = Table::new("users")
//!     .column(Column::new("id", ColumnType::Identifier))
//!     .index("users_email", ["email"]);
//! let errors = validate_schema(&[bad]);
//! assert!(matches!(errors[0], ValidationError::UnknownIndexColumn { .. }));
//! ```

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::model::Table;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("static regex must compile")
});

/// Schema validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A table, column or index name is empty or not a plain identifier.
    #[error("invalid {kind} name: '{name}'")]
    InvalidName { kind: &'static str, name: String },
    /// Two tables share a name.
    #[error("duplicate table: {0}")]
    DuplicateTable(String),
    /// A table declares no columns.
    #[error("table '{0}' has no columns")]
    EmptyTable(String),
    /// Two columns of one table share a name.
    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },
    /// Two indexes share a name. Index names are unique per database on
    /// SQLite and PostgreSQL, so this is checked across tables.
    #[error("duplicate index: {0}")]
    DuplicateIndex(String),
    /// An index has no columns.
    #[error("index '{0}' has no columns")]
    EmptyIndex(String),
    /// An index names a column its table does not declare.
    #[error("index '{index}' references unknown column '{column}' of table '{table}'")]
    UnknownIndexColumn {
        table: String,
        index: String,
        column: String,
    },
    /// An index declared under one table names another as its owner.
    #[error("index '{index}' is declared on table '{table}' but owned by '{owner}'")]
    IndexOwnerMismatch {
        table: String,
        index: String,
        owner: String,
    },
    /// A primary key names a column its table does not declare.
    #[error("primary key of table '{table}' references unknown column '{column}'")]
    UnknownPrimaryKeyColumn { table: String, column: String },
    /// A primary key with no columns.
    #[error("primary key of table '{0}' is empty")]
    EmptyPrimaryKey(String),
}

/// Validates a desired schema.
///
/// Returns every problem found, in table order; an empty vector means the
/// schema is usable.
pub fn validate_schema(tables: &[Table]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut table_names = HashSet::new();
    let mut index_names = HashSet::new();

    for table in tables {
        check_name(&mut errors, "table", &table.name);
        if !table_names.insert(table.name.as_str()) {
            errors.push(ValidationError::DuplicateTable(table.name.clone()));
        }
        errors.extend(validate_table(table));

        for index in &table.indexes {
            if !index_names.insert(index.name.as_str()) {
                errors.push(ValidationError::DuplicateIndex(index.name.clone()));
            }
        }
    }

    errors
}

fn validate_table(table: &Table) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if table.columns.is_empty() {
        errors.push(ValidationError::EmptyTable(table.name.clone()));
    }

    let mut columns = HashSet::new();
    for column in &table.columns {
        check_name(&mut errors, "column", &column.name);
        if !columns.insert(column.name.as_str()) {
            errors.push(ValidationError::DuplicateColumn {
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }
    }

    if let Some(primary_key) = &table.primary_key {
        if primary_key.is_empty() {
            errors.push(ValidationError::EmptyPrimaryKey(table.name.clone()));
        }
        for column in primary_key {
            if !columns.contains(column.as_str()) {
                errors.push(ValidationError::UnknownPrimaryKeyColumn {
                    table: table.name.clone(),
                    column: column.clone(),
                });
            }
        }
    }

    for index in &table.indexes {
        check_name(&mut errors, "index", &index.name);
        if !index.table.is_empty() && index.table != table.name {
            errors.push(ValidationError::IndexOwnerMismatch {
                table: table.name.clone(),
                index: index.name.clone(),
                owner: index.table.clone(),
            });
        }
        if index.columns.is_empty() {
            errors.push(ValidationError::EmptyIndex(index.name.clone()));
        }
        for column in &index.columns {
            if !columns.contains(column.as_str()) {
                errors.push(ValidationError::UnknownIndexColumn {
                    table: table.name.clone(),
                    index: index.name.clone(),
                    column: column.clone(),
                });
            }
        }
    }

    errors
}

fn check_name(errors: &mut Vec<ValidationError>, kind: &'static str, name: &str) {
    if !IDENTIFIER.is_match(name) {
        errors.push(ValidationError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
}
