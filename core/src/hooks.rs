//! Upgrade hooks.
//!
//! A [`Hook`] runs once per upgrade, either before any table is processed or
//! after every table is done. Hooks work through [`SchemaOps`], whose guarded
//! operations make them safe to run on every upgrade.
//!
//! Every hook of a phase runs even when an earlier one fails. The failures
//! are collected into a single [`UpgradeError::Hooks`] once the phase ends.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HookFailure, Operation, Phase, Result, UpgradeError};
use crate::ops::SchemaOps;
use crate::port::Value;
use crate::report::HookReport;

/// A unit of work run before or after the table upgrades.
pub trait Hook: Send + Sync {
    /// Label used in logs, reports and failures.
    fn name(&self) -> String;

    fn phase(&self) -> Phase;

    /// Applies the hook, returning `true` when it changed the database.
    fn apply(&self, ops: &mut SchemaOps<'_>) -> Result<bool>;
}

/// Renames a column whose historical name was wrong.
///
/// Does nothing while the table does not exist or once the rename happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyColumnRename {
    pub table: String,
    pub old: String,
    pub new: String,
}

impl LegacyColumnRename {
    pub fn new(
        table: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            old: old.into(),
            new: new.into(),
        }
    }
}

impl Hook for LegacyColumnRename {
    fn name(&self) -> String {
        format!("rename {}.{} to {}", self.table, self.old, self.new)
    }

    fn phase(&self) -> Phase {
        Phase::Before
    }

    fn apply(&self, ops: &mut SchemaOps<'_>) -> Result<bool> {
        if !ops.table_exists(&self.table)? {
            return Ok(false);
        }
        ops.rename_column(&self.table, &self.old, &self.new)
    }
}

/// Drops an obsolete table if it is still present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropLegacyTable {
    pub table: String,
}

impl DropLegacyTable {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl Hook for DropLegacyTable {
    fn name(&self) -> String {
        format!("drop table {}", self.table)
    }

    fn phase(&self) -> Phase {
        Phase::Before
    }

    fn apply(&self, ops: &mut SchemaOps<'_>) -> Result<bool> {
        ops.drop_table(&self.table)
    }
}

/// Inserts required rows that are missing, matched on `key_column`.
///
/// Existing rows are never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedRows {
    pub table: String,
    pub key_column: String,
    pub rows: Vec<BTreeMap<String, serde_json::Value>>,
}

impl SeedRows {
    pub fn new(table: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_column: key_column.into(),
            rows: Vec::new(),
        }
    }

    pub fn row<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.rows.push(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    fn key_error(&self, message: &str) -> UpgradeError {
        UpgradeError::execution(
            Operation::Statement,
            &self.table,
            Some(&self.key_column),
            message.into(),
        )
    }
}

impl Hook for SeedRows {
    fn name(&self) -> String {
        format!("seed {} by {}", self.table, self.key_column)
    }

    fn phase(&self) -> Phase {
        Phase::After
    }

    fn apply(&self, ops: &mut SchemaOps<'_>) -> Result<bool> {
        let count_sql = ops.generator().count_where(&self.table, &self.key_column);
        let mut inserted = 0usize;

        for row in &self.rows {
            // `key = NULL` never matches, so a null key would insert on every run.
            let key = match row.get(&self.key_column) {
                Some(serde_json::Value::Null) => {
                    return Err(self.key_error("seed row has a null key value"));
                }
                Some(key) => key,
                None => return Err(self.key_error("seed row has no value for the key column")),
            };

            if ops.count(&self.table, &count_sql, &[Value::from(key.clone())])? > 0 {
                continue;
            }

            let columns: Vec<String> = row.keys().cloned().collect();
            let params: Vec<Value> = row.values().cloned().map(Value::from).collect();
            let sql = ops.generator().insert(&self.table, &columns);
            ops.execute(&self.table, &sql, &params)?;
            inserted += 1;
        }

        if inserted > 0 {
            debug!(table = %self.table, inserted, "seeded rows");
        }
        Ok(inserted > 0)
    }
}

/// An ordered collection of hooks.
#[derive(Default)]
pub struct GenericHooks {
    hooks: Vec<Box<dyn Hook>>,
}

impl GenericHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: impl Hook + 'static) -> Self {
        self.push(hook);
        self
    }

    pub fn push(&mut self, hook: impl Hook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook of `phase` in registration order.
    ///
    /// Cancellation aborts the phase immediately; any other failure is
    /// recorded and the next hook runs.
    pub fn run_phase(&self, phase: Phase, ops: &mut SchemaOps<'_>) -> Result<Vec<HookReport>> {
        let mut reports = Vec::new();
        let mut failures = Vec::new();

        for hook in self.hooks.iter().filter(|h| h.phase() == phase) {
            let name = hook.name();
            match hook.apply(ops) {
                Ok(changed) => {
                    debug!(hook = %name, %phase, changed, "hook finished");
                    reports.push(HookReport {
                        hook: name,
                        phase,
                        changed,
                    });
                }
                Err(UpgradeError::Cancelled) => return Err(UpgradeError::Cancelled),
                Err(error) => {
                    warn!(hook = %name, %phase, error = %error, "hook failed");
                    failures.push(HookFailure { hook: name, error });
                }
            }
        }

        if failures.is_empty() {
            Ok(reports)
        } else {
            Err(UpgradeError::Hooks { phase, failures })
        }
    }
}

impl fmt::Debug for GenericHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| (h.phase(), h.name())))
            .finish()
    }
}
