//! Declarative schema upgrades.
//!
//! This crate brings a live relational database up to a desired schema
//! without ever dropping tables or deleting rows on its own:
//!
//! - [`Table`], [`Column`], [`ColumnType`], [`Index`]: the desired schema.
//! - [`Generator`]: renders DDL for one dialect, with a per-dialect
//!   [`TypeMap`] of overrides checked before [`default_column_type`].
//! - [`Introspector`]: reads what currently exists through a [`Connection`].
//! - [`Upgrader`]: creates missing tables, adds missing columns and indexes,
//!   and applies explicit renames and drops from [`UpgradeInstructions`].
//! - [`Hook`]s: generic work run before or after the table upgrades.
//!
//! Running the same upgrade twice issues no statements the second time.
//!
//! # Example
//!
//! ```
//! use schema_upgrade_core::*;
//!
//! let users = Table::new("users")
//!     .column(Column::new("id", ColumnType::Identifier))
//!     .column(Column::new("email", ColumnType::Varchar(255)))
//!     .column(Column::new("created_at", ColumnType::Timestamp { timezone: true }))
//!     .primary_key(["id"])
//!     .unique_index("users_email", ["email"]);
//! assert!(validate_schema(std::slice::from_ref(&users)).is_empty());
//!
//! let sqlite = Dialect::Sqlite.generator();
//! assert_eq!(
//!     sqlite.create_table(&users),
//!     "CREATE TABLE \"users\" (\n    \"id\" BIGINT NOT NULL,\n    \"email\" VARCHAR(255) NOT NULL,\n    \"created_at\" TIMESTAMP NOT NULL,\n    PRIMARY KEY (\"id\")\n)"
//! );
//!
//! let plan = plan_create(&sqlite, &users);
//! assert_eq!(plan.len(), 2);
//! ```

mod config;
pub mod dialect;
mod error;
mod generator;
mod hooks;
mod instructions;
mod introspect;
mod model;
mod ops;
mod plan;
mod port;
mod report;
#[cfg(test)]
mod testing;
mod upgrader;
mod validate;

pub use config::{ConfigError, HookConfig, SchemaDocument, SqliteSettings, UpgradeConfig};
pub use dialect::{Dialect, UnknownDialect};
pub use error::{HookFailure, Operation, Phase, PortError, Result, UpgradeError};
pub use generator::{Generator, QuoteStyle, TypeMap, TypeOverride, default_column_type};
pub use hooks::{DropLegacyTable, GenericHooks, Hook, LegacyColumnRename, SeedRows};
pub use instructions::{ColumnRename, UpgradeInstructions};
pub use introspect::{Introspector, live_column_map};
pub use model::{Column, ColumnKind, ColumnType, Index, LiveColumn, ParseColumnTypeError, Table};
pub use ops::SchemaOps;
pub use plan::{PlanKind, PlannedStatement, Step, TablePlan, plan_create, plan_upgrade};
pub use port::{Connection, Row, Value};
pub use report::{
    HookReport, TableOutcome, TableReport, UpgradeReport, schema_fingerprint,
};
pub use upgrader::{Cancellation, Upgrader};
pub use validate::{ValidationError, validate_schema};
