//! SQLite binding for schema upgrades.
//!
//! This crate connects the dialect-independent engine in
//! [`schema_upgrade_core`] to SQLite through `rusqlite`:
//!
//! - [`SqliteConnection`] implements the [`Connection`](schema_upgrade_core::Connection)
//!   port, runs each plan inside `BEGIN`/`COMMIT` and exposes rusqlite's
//!   interrupt handle.
//! - [`SqliteUpgrader`] opens a database file and runs, plans or reports the
//!   status of an upgrade.
//!
//! SQLite cannot add a primary key to an existing table. A desired primary
//! key that is missing from a live table fails the run with
//! [`UpgradeError::UnsupportedOperation`](schema_upgrade_core::UpgradeError::UnsupportedOperation).
//!
//! # Quick start
//!
//! ```
//! use schema_upgrade_core::{Column, ColumnType, Table, UpgradeInstructions};
//! use schema_upgrade_sqlite::{SqliteConnection, SqliteOptions, SqliteUpgrader};
//!
//! let conn = SqliteConnection::open_in_memory(&SqliteOptions::default()).unwrap();
//! let mut upgrader = SqliteUpgrader::new(conn);
//!
//! let tables = vec![
//!     Table::new("users")
//!         .column(Column::new("id", ColumnType::Integer))
//!         .column(Column::new("email", ColumnType::Text))
//!         .unique_index("users_email", ["email"]),
//! ];
//!
//! let report = upgrader.run(&tables, &UpgradeInstructions::new()).unwrap();
//! assert_eq!(report.statement_count(), 2);
//!
//! let rerun = upgrader.run(&tables, &UpgradeInstructions::new()).unwrap();
//! assert!(rerun.is_noop());
//! ```

mod connection;
mod error;
mod upgrade;

pub use connection::{SqliteConnection, SqliteOptions};
pub use error::{Result, SqliteError};
pub use upgrade::{SqliteUpgrader, TableStatus};
