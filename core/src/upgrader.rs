//! Upgrade orchestration.
//!
//! Each table moves through `existence check -> create | upgrade -> done`.
//! Tables are processed one at a time in the order given and the first
//! failure stops the run: later tables are not touched and `After` hooks do
//! not run.
//!
//! # Examples
//!
//! ```no_run
//! use schema_upgrade_core::{
//!     Column, ColumnType, Connection, Dialect, Table, UpgradeInstructions, Upgrader,
//! };
//!
//! fn upgrade(conn: &mut dyn Connection) -> schema_upgrade_core::Result<()> {
//!     let tables = vec![
//!         Table::new("users")
//!             .column(Column::new("id", ColumnType::Identifier))
//!             .column(Column::new("email", ColumnType::Text))
//!             .primary_key(["id"])
//!             .unique_index("users_email", ["email"]),
//!     ];
//!     let instructions = UpgradeInstructions::new().rename("users", "mail", "email");
//!
//!     let report = Upgrader::for_dialect(Dialect::Sqlite).run(conn, &tables, &instructions)?;
//!     println!("{} statements applied", report.statement_count());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::dialect::Dialect;
use crate::error::{Phase, Result};
use crate::generator::Generator;
use crate::hooks::GenericHooks;
use crate::instructions::UpgradeInstructions;
use crate::introspect::Introspector;
use crate::model::Table;
use crate::ops::SchemaOps;
use crate::plan::{PlanKind, TablePlan, plan_create, plan_upgrade};
use crate::port::Connection;
use crate::report::{TableReport, UpgradeReport};

/// Shared flag that stops a run before its next statement.
///
/// Statements already committed stay applied.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Brings a database up to a desired schema.
pub struct Upgrader {
    generator: Generator,
    introspector: Box<dyn Introspector>,
    hooks: GenericHooks,
    cancellation: Cancellation,
}

impl Upgrader {
    pub fn new(generator: Generator, introspector: Box<dyn Introspector>) -> Self {
        Self {
            generator,
            introspector,
            hooks: GenericHooks::new(),
            cancellation: Cancellation::new(),
        }
    }

    /// Creates an upgrader with the dialect's generator and introspector.
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self::new(dialect.generator(), dialect.introspector())
    }

    pub fn with_hooks(mut self, hooks: GenericHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Returns a handle that cancels this upgrader's runs.
    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    /// Runs `Before` hooks, upgrades every table in order, then runs `After`
    /// hooks.
    ///
    /// # Errors
    ///
    /// Returns the first table failure, [`UpgradeError::Hooks`] when any hook of
    /// a phase failed, or [`UpgradeError::Cancelled`].
    ///
    /// [`UpgradeError::Hooks`]: crate::UpgradeError::Hooks
    /// [`UpgradeError::Cancelled`]: crate::UpgradeError::Cancelled
    pub fn run(
        &self,
        conn: &mut dyn Connection,
        tables: &[Table],
        instructions: &UpgradeInstructions,
    ) -> Result<UpgradeReport> {
        let mut report = UpgradeReport::start(&self.generator, tables);
        info!(
            dialect = %report.dialect,
            tables = tables.len(),
            fingerprint = %report.schema_fingerprint,
            "starting schema upgrade"
        );

        let mut ops = SchemaOps::new(
            conn,
            &self.generator,
            self.introspector.as_ref(),
            &self.cancellation,
        );

        report
            .hooks
            .extend(self.hooks.run_phase(Phase::Before, &mut ops)?);

        for (position, table) in tables.iter().enumerate() {
            let outcome = self.upgrade_table(&mut ops, table, instructions);
            match outcome {
                Ok(table_report) => report.tables.push(table_report),
                Err(err) => {
                    warn!(
                        table = %table.name,
                        error = %err,
                        skipped = tables.len() - position - 1,
                        "table upgrade failed; stopping"
                    );
                    return Err(err);
                }
            }
        }

        report
            .hooks
            .extend(self.hooks.run_phase(Phase::After, &mut ops)?);

        report.finish();
        info!(
            statements = report.statement_count(),
            hooks = report.hooks.len(),
            "schema upgrade complete"
        );
        Ok(report)
    }

    /// Computes every table's plan without executing anything.
    ///
    /// No transaction is opened and no hook runs, so plans for tables that
    /// hooks would rename or seed reflect the database as it is now.
    pub fn plan(
        &self,
        conn: &mut dyn Connection,
        tables: &[Table],
        instructions: &UpgradeInstructions,
    ) -> Result<Vec<TablePlan>> {
        let mut ops = SchemaOps::new(
            conn,
            &self.generator,
            self.introspector.as_ref(),
            &self.cancellation,
        );
        tables
            .iter()
            .map(|table| self.plan_table(&mut ops, table, instructions))
            .collect()
    }

    fn upgrade_table(
        &self,
        ops: &mut SchemaOps<'_>,
        table: &Table,
        instructions: &UpgradeInstructions,
    ) -> Result<TableReport> {
        let plan = self.plan_table(ops, table, instructions)?;
        if plan.is_empty() {
            debug!(table = %table.name, "table is up to date");
            return Ok(TableReport::from_plan(&plan));
        }

        ops.apply(&plan, self.generator.transactional_ddl())?;

        let action = match plan.kind {
            PlanKind::Create => "created table",
            PlanKind::Upgrade => "upgraded table",
        };
        info!(table = %table.name, statements = plan.len(), "{action}");
        Ok(TableReport::from_plan(&plan))
    }

    fn plan_table(
        &self,
        ops: &mut SchemaOps<'_>,
        table: &Table,
        instructions: &UpgradeInstructions,
    ) -> Result<TablePlan> {
        if !ops.table_exists(&table.name)? {
            return Ok(plan_create(&self.generator, table));
        }
        let live = ops.columns(&table.name)?;
        let live_indexes = ops.indexes(&table.name)?;
        plan_upgrade(&self.generator, table, &live, &live_indexes, instructions)
    }
}
