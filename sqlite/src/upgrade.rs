//! Upgrades for SQLite files.
//!
//! [`SqliteUpgrader`] bundles a [`SqliteConnection`] with the SQLite dialect
//! so callers do not wire the generator and introspector themselves.
//!
//! # Example
//!
//! ```no_run
//! use schema_upgrade_core::{Column, ColumnType, Table, UpgradeInstructions};
//! use schema_upgrade_sqlite::{SqliteOptions, SqliteUpgrader};
//!
//! let tables = vec![
//!     Table::new("users")
//!         .column(Column::new("id", ColumnType::Identifier))
//!         .column(Column::new("email", ColumnType::Text))
//!         .primary_key(["id"]),
//! ];
//!
//! let mut upgrader = SqliteUpgrader::open("app.db", &SqliteOptions::default()).unwrap();
//! for status in upgrader.status(&tables, &UpgradeInstructions::new()).unwrap() {
//!     println!("{}: {} pending", status.table, status.pending.len());
//! }
//! upgrader.run(&tables, &UpgradeInstructions::new()).unwrap();
//! ```

use std::path::Path;

use schema_upgrade_core::{
    Cancellation, Dialect, GenericHooks, PlanKind, Step, Table, TablePlan, UpgradeConfig,
    UpgradeInstructions, UpgradeReport, Upgrader,
};
use serde::Serialize;
use tracing::debug;

use crate::connection::{SqliteConnection, SqliteOptions};
use crate::error::Result;

/// Pending work for one table, as reported by [`SqliteUpgrader::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatus {
    pub table: String,
    pub exists: bool,
    /// Row count of an existing table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    pub pending: Vec<Step>,
}

impl TableStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Upgrades one SQLite database.
pub struct SqliteUpgrader {
    conn: SqliteConnection,
    upgrader: Upgrader,
}

impl SqliteUpgrader {
    pub fn new(conn: SqliteConnection) -> Self {
        Self {
            conn,
            upgrader: Upgrader::for_dialect(Dialect::Sqlite),
        }
    }

    /// Opens the database at `path` with `options`.
    pub fn open(path: impl AsRef<Path>, options: &SqliteOptions) -> Result<Self> {
        Ok(Self::new(SqliteConnection::open(path, options)?))
    }

    /// Opens the database at `path` with the configuration's SQLite settings
    /// and hooks.
    pub fn from_config(path: impl AsRef<Path>, config: &UpgradeConfig) -> Result<Self> {
        let options = SqliteOptions::from(&config.sqlite);
        Ok(Self::open(path, &options)?.with_hooks(config.hooks()))
    }

    pub fn with_hooks(mut self, hooks: GenericHooks) -> Self {
        self.upgrader = self.upgrader.with_hooks(hooks);
        self
    }

    /// Returns a handle that stops the run before its next statement.
    pub fn cancellation(&self) -> Cancellation {
        self.upgrader.cancellation()
    }

    pub fn run(
        &mut self,
        tables: &[Table],
        instructions: &UpgradeInstructions,
    ) -> Result<UpgradeReport> {
        Ok(self.upgrader.run(&mut self.conn, tables, instructions)?)
    }

    pub fn plan(
        &mut self,
        tables: &[Table],
        instructions: &UpgradeInstructions,
    ) -> Result<Vec<TablePlan>> {
        Ok(self.upgrader.plan(&mut self.conn, tables, instructions)?)
    }

    /// Reports every table's pending steps without applying them.
    pub fn status(
        &mut self,
        tables: &[Table],
        instructions: &UpgradeInstructions,
    ) -> Result<Vec<TableStatus>> {
        let plans = self.plan(tables, instructions)?;
        plans
            .into_iter()
            .map(|plan| -> Result<TableStatus> {
                let exists = plan.kind == PlanKind::Upgrade;
                let rows = if exists {
                    Some(self.count_rows(&plan.table)?)
                } else {
                    None
                };
                debug!(table = %plan.table, exists, pending = plan.len(), "table status");
                Ok(TableStatus {
                    table: plan.table,
                    exists,
                    rows,
                    pending: plan.statements.into_iter().map(|s| s.step).collect(),
                })
            })
            .collect()
    }

    pub fn connection(&self) -> &SqliteConnection {
        &self.conn
    }

    pub fn into_connection(self) -> SqliteConnection {
        self.conn
    }

    fn count_rows(&self, table: &str) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            self.upgrader.generator().quote_ident(table)
        );
        let count: i64 = self
            .conn
            .connection()
            .query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}
