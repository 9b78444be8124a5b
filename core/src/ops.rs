//! Guarded structural operations.
//!
//! [`SchemaOps`] is what hooks see of the database. Each operation
//! introspects the table again on every call and does nothing when its
//! target state already holds, so a hook can run on every upgrade.
//!
//! # Examples
//!
//! ```no_run
//! use schema_upgrade_core::{Column, ColumnType, Result, SchemaOps};
//!
//! fn add_audit_column(ops: &mut SchemaOps<'_>) -> Result<bool> {
//!     let column = Column::new("updated_at", ColumnType::Timestamp { timezone: true }).nullable();
//!     ops.add_column("users", &column)
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::{Operation, Result, UpgradeError};
use crate::generator::Generator;
use crate::introspect::{Introspector, live_column_map};
use crate::model::{Column, Index, LiveColumn, Table};
use crate::plan::{TablePlan, resolve_rename};
use crate::port::{Connection, Row, Value};
use crate::upgrader::Cancellation;

/// A connection paired with one dialect's generator and introspector.
pub struct SchemaOps<'a> {
    conn: &'a mut dyn Connection,
    generator: &'a Generator,
    introspector: &'a dyn Introspector,
    cancellation: &'a Cancellation,
}

impl<'a> SchemaOps<'a> {
    pub fn new(
        conn: &'a mut dyn Connection,
        generator: &'a Generator,
        introspector: &'a dyn Introspector,
        cancellation: &'a Cancellation,
    ) -> Self {
        Self {
            conn,
            generator,
            introspector,
            cancellation,
        }
    }

    pub fn generator(&self) -> &Generator {
        self.generator
    }

    pub fn table_exists(&mut self, table: &str) -> Result<bool> {
        let exists = self.introspector.table_exists(&mut *self.conn, table)?;
        debug!(table, exists, "checked table existence");
        Ok(exists)
    }

    /// Live columns keyed by name.
    pub fn columns(&mut self, table: &str) -> Result<BTreeMap<String, LiveColumn>> {
        let columns = self.introspector.columns(&mut *self.conn, table)?;
        debug!(table, columns = columns.len(), "introspected columns");
        Ok(live_column_map(columns))
    }

    pub fn indexes(&mut self, table: &str) -> Result<BTreeSet<String>> {
        let indexes = self.introspector.indexes(&mut *self.conn, table)?;
        debug!(table, indexes = indexes.len(), "introspected indexes");
        Ok(indexes)
    }

    /// Creates `table` and its indexes unless it already exists.
    pub fn create_table(&mut self, table: &Table) -> Result<bool> {
        if self.table_exists(&table.name)? {
            return Ok(false);
        }
        let sql = self.generator.create_table(table);
        self.exec(Operation::CreateTable, &table.name, None, &sql, &[])?;
        for index in &table.indexes {
            let sql = self.generator.create_index(table, index);
            self.exec(Operation::CreateIndex, &table.name, Some(&index.name), &sql, &[])?;
        }
        Ok(true)
    }

    /// Adds `column` unless the table already has a column of that name.
    pub fn add_column(&mut self, table: &str, column: &Column) -> Result<bool> {
        if self.columns(table)?.contains_key(&column.name) {
            return Ok(false);
        }
        let sql = self.generator.add_column(table, column);
        self.exec(Operation::AddColumn, table, Some(&column.name), &sql, &[])?;
        Ok(true)
    }

    /// Drops `column` if present.
    pub fn drop_column(&mut self, table: &str, column: &str) -> Result<bool> {
        if !self.columns(table)?.contains_key(column) {
            return Ok(false);
        }
        let sql = self.generator.drop_column(table, column);
        self.exec(Operation::DropColumn, table, Some(column), &sql, &[])?;
        Ok(true)
    }

    /// Renames `old` to `new` unless the rename already happened.
    ///
    /// # Errors
    ///
    /// [`UpgradeError::SchemaDrift`] when neither column exists and
    /// [`UpgradeError::NameCollision`] when both do.
    pub fn rename_column(&mut self, table: &str, old: &str, new: &str) -> Result<bool> {
        let live = self.columns(table)?;
        let pending = resolve_rename(
            table,
            old,
            new,
            live.contains_key(old),
            live.contains_key(new),
        )?;
        if !pending {
            return Ok(false);
        }
        let sql = self.generator.rename_column(table, old, new);
        self.exec(Operation::RenameColumn, table, Some(old), &sql, &[])?;
        Ok(true)
    }

    /// Drops `table` if it exists.
    pub fn drop_table(&mut self, table: &str) -> Result<bool> {
        if !self.table_exists(table)? {
            return Ok(false);
        }
        let sql = self.generator.drop_table(table);
        self.exec(Operation::DropTable, table, None, &sql, &[])?;
        Ok(true)
    }

    /// Adds a primary key over `columns` unless the table already has one.
    pub fn add_primary_key(&mut self, table: &str, columns: &[String]) -> Result<bool> {
        if self.columns(table)?.values().any(|c| c.primary_key) {
            return Ok(false);
        }
        let sql = self.generator.add_primary_key(table, columns).ok_or_else(|| {
            UpgradeError::UnsupportedOperation {
                dialect: self.generator.dialect().to_string(),
                operation: Operation::AddPrimaryKey,
                table: table.to_string(),
            }
        })?;
        self.exec(Operation::AddPrimaryKey, table, None, &sql, &[])?;
        Ok(true)
    }

    /// Creates `index` unless an index of that name exists on its table.
    ///
    /// `table` is the declared owner of the index and supplies column types.
    pub fn create_index(&mut self, table: &Table, index: &Index) -> Result<bool> {
        if self.indexes(&index.table)?.contains(&index.name) {
            return Ok(false);
        }
        let sql = self.generator.create_index(table, index);
        self.exec(Operation::CreateIndex, &index.table, Some(&index.name), &sql, &[])?;
        Ok(true)
    }

    /// Executes one hook-supplied statement against `table`.
    pub fn execute(&mut self, table: &str, sql: &str, params: &[Value]) -> Result<u64> {
        self.exec(Operation::Statement, table, None, sql, params)
    }

    /// Runs one hook-supplied query against `table`.
    pub fn query(&mut self, table: &str, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.check_cancelled()?;
        debug!(table, sql, "running query");
        self.conn
            .query(sql, params)
            .map_err(|source| UpgradeError::execution(Operation::Statement, table, None, source))
    }

    /// Runs a query whose first column of the first row is a count.
    pub fn count(&mut self, table: &str, sql: &str, params: &[Value]) -> Result<i64> {
        let rows = self.query(table, sql, params)?;
        rows.first()
            .and_then(|row| row.get_index(0))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                UpgradeError::execution(
                    Operation::Statement,
                    table,
                    None,
                    "query returned no count".into(),
                )
            })
    }

    /// Applies a table plan, inside one transaction when `transactional`.
    ///
    /// A failed transactional plan is rolled back before the error is
    /// returned. Without transactions the statements before the failing one
    /// stay applied.
    pub(crate) fn apply(&mut self, plan: &TablePlan, transactional: bool) -> Result<()> {
        if !transactional {
            return self.apply_statements(plan);
        }

        self.check_cancelled()?;
        self.conn.begin().map_err(|source| {
            UpgradeError::execution(Operation::Transaction, &plan.table, None, source)
        })?;

        match self.apply_statements(plan) {
            Ok(()) => self.conn.commit().map_err(|source| {
                UpgradeError::execution(Operation::Transaction, &plan.table, None, source)
            }),
            Err(err) => {
                if let Err(rollback) = self.conn.rollback() {
                    warn!(table = %plan.table, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    fn apply_statements(&mut self, plan: &TablePlan) -> Result<()> {
        for statement in &plan.statements {
            self.exec(
                statement.step.operation(),
                &plan.table,
                statement.step.object(),
                &statement.sql,
                &[],
            )?;
        }
        Ok(())
    }

    fn exec(
        &mut self,
        operation: Operation,
        table: &str,
        object: Option<&str>,
        sql: &str,
        params: &[Value],
    ) -> Result<u64> {
        self.check_cancelled()?;
        debug!(table, object, %operation, sql, "executing statement");
        self.conn
            .execute(sql, params)
            .map_err(|source| UpgradeError::execution(operation, table, object, source))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(UpgradeError::Cancelled);
        }
        Ok(())
    }
}
