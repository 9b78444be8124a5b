//! Outcome of an upgrade run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Phase;
use crate::generator::Generator;
use crate::model::Table;
use crate::plan::{PlanKind, Step, TablePlan};

/// What happened to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableOutcome {
    Created,
    Upgraded,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub outcome: TableOutcome,
    /// Steps applied, in execution order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<Step>,
}

impl TableReport {
    pub(crate) fn from_plan(plan: &TablePlan) -> Self {
        let outcome = match (plan.kind, plan.is_empty()) {
            (_, true) => TableOutcome::Unchanged,
            (PlanKind::Create, false) => TableOutcome::Created,
            (PlanKind::Upgrade, false) => TableOutcome::Upgraded,
        };
        Self {
            table: plan.table.clone(),
            outcome,
            changes: plan.statements.iter().map(|s| s.step.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookReport {
    pub hook: String,
    pub phase: Phase,
    pub changed: bool,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub dialect: String,
    /// SHA-256 of the desired schema's DDL for this dialect.
    pub schema_fingerprint: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables: Vec<TableReport>,
    pub hooks: Vec<HookReport>,
}

impl UpgradeReport {
    pub(crate) fn start(generator: &Generator, tables: &[Table]) -> Self {
        let now = Utc::now();
        Self {
            dialect: generator.dialect().to_string(),
            schema_fingerprint: schema_fingerprint(generator, tables),
            started_at: now,
            finished_at: now,
            tables: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// Number of statements the run applied across all tables.
    pub fn statement_count(&self) -> usize {
        self.tables.iter().map(|t| t.changes.len()).sum()
    }

    pub fn count(&self, outcome: TableOutcome) -> usize {
        self.tables.iter().filter(|t| t.outcome == outcome).count()
    }

    /// Returns `true` when neither a table nor a hook changed anything.
    pub fn is_noop(&self) -> bool {
        self.statement_count() == 0 && !self.hooks.iter().any(|h| h.changed)
    }
}

/// Fingerprints the DDL the generator would emit to create `tables`.
///
/// Two runs against the same schema and dialect report the same value.
pub fn schema_fingerprint(generator: &Generator, tables: &[Table]) -> String {
    let mut hasher = Sha256::new();
    for table in tables {
        hasher.update(generator.create_table(table).as_bytes());
        hasher.update(b";\n");
        for index in &table.indexes {
            hasher.update(generator.create_index(table, index).as_bytes());
            hasher.update(b";\n");
        }
    }
    format!("{:x}", hasher.finalize())
}
