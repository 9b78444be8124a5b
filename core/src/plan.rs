//! Pure diff between a desired table and its introspected state.
//!
//! The planner turns one introspection snapshot into an ordered list of
//! statements. Column state is a name-keyed set throughout, so neither the
//! declaration order nor the engine's column order can change the outcome.
//!
//! Step order for an existing table is fixed: add columns, drop columns,
//! rename columns, add the primary key, create missing indexes.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::{Operation, Result, UpgradeError};
use crate::generator::Generator;
use crate::instructions::{ColumnRename, UpgradeInstructions};
use crate::model::{LiveColumn, Table};

/// One structural step of a table plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    CreateTable,
    CreateIndex { index: String },
    AddColumn { column: String },
    DropColumn { column: String },
    RenameColumn { old: String, new: String },
    AddPrimaryKey { columns: Vec<String> },
}

impl Step {
    pub fn operation(&self) -> Operation {
        match self {
            Self::CreateTable => Operation::CreateTable,
            Self::CreateIndex { .. } => Operation::CreateIndex,
            Self::AddColumn { .. } => Operation::AddColumn,
            Self::DropColumn { .. } => Operation::DropColumn,
            Self::RenameColumn { .. } => Operation::RenameColumn,
            Self::AddPrimaryKey { .. } => Operation::AddPrimaryKey,
        }
    }

    /// The column or index the step targets, for error context.
    pub fn object(&self) -> Option<&str> {
        match self {
            Self::CreateTable | Self::AddPrimaryKey { .. } => None,
            Self::CreateIndex { index } => Some(index),
            Self::AddColumn { column } | Self::DropColumn { column } => Some(column),
            Self::RenameColumn { old, .. } => Some(old),
        }
    }
}

/// A step together with the SQL that performs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStatement {
    #[serde(flatten)]
    pub step: Step,
    pub sql: String,
}

/// Whether the table is created from scratch or brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Create,
    Upgrade,
}

/// Ordered statements for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePlan {
    pub table: String,
    pub kind: PlanKind,
    pub statements: Vec<PlannedStatement>,
}

impl TablePlan {
    fn new(table: &str, kind: PlanKind) -> Self {
        Self {
            table: table.to_string(),
            kind,
            statements: Vec::new(),
        }
    }

    fn push(&mut self, step: Step, sql: String) {
        self.statements.push(PlannedStatement { step, sql });
    }

    /// Returns `true` if the table is already up to date.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }
}

/// Plans a missing table: `CREATE TABLE`, then every index in declaration order.
pub fn plan_create(generator: &Generator, table: &Table) -> TablePlan {
    let mut plan = TablePlan::new(&table.name, PlanKind::Create);
    plan.push(Step::CreateTable, generator.create_table(table));
    for index in &table.indexes {
        plan.push(
            Step::CreateIndex {
                index: index.name.clone(),
            },
            generator.create_index(table, index),
        );
    }
    plan
}

/// Plans the delta between `table` and its live columns and indexes.
///
/// # Errors
///
/// - [`UpgradeError::SchemaDrift`] if a rename's old and new columns are both missing.
/// - [`UpgradeError::NameCollision`] if a rename's new column exists next to the old one.
/// - [`UpgradeError::ConflictingInstructions`] if a live column is both dropped
///   and renamed.
/// - [`UpgradeError::UnsupportedOperation`] if a primary key is missing and the
///   dialect cannot add one.
pub fn plan_upgrade(
    generator: &Generator,
    table: &Table,
    live: &BTreeMap<String, LiveColumn>,
    live_indexes: &BTreeSet<String>,
    instructions: &UpgradeInstructions,
) -> Result<TablePlan> {
    let name = table.name.as_str();
    let mut plan = TablePlan::new(name, PlanKind::Upgrade);

    // Renames resolve in order against the snapshot with earlier renames
    // applied, so `a -> b, b -> c` is a valid chain.
    let listed = instructions.renames_for(name);
    let mut names: BTreeSet<&str> = live.keys().map(String::as_str).collect();
    let mut renames = Vec::new();
    for (i, rename) in listed.iter().enumerate() {
        let has_old = names.contains(rename.old.as_str());
        let has_new = names.contains(rename.new.as_str())
            || (!has_old && names.contains(chain_end(&rename.new, &listed[i + 1..])));
        if resolve_rename(name, &rename.old, &rename.new, has_old, has_new)? {
            names.remove(rename.old.as_str());
            names.insert(rename.new.as_str());
            renames.push(rename);
        }
    }

    for column in instructions.drops_for(name) {
        if live.contains_key(column) && renames.iter().any(|r| &r.old == column) {
            return Err(UpgradeError::ConflictingInstructions {
                table: name.to_string(),
                column: column.clone(),
            });
        }
    }

    // Every rename target arrives through its rename, even a chain's middle link.
    let targets: BTreeSet<&str> = renames.iter().map(|r| r.new.as_str()).collect();
    for column in &table.columns {
        if live.contains_key(&column.name) || targets.contains(column.name.as_str()) {
            continue;
        }
        plan.push(
            Step::AddColumn {
                column: column.name.clone(),
            },
            generator.add_column(name, column),
        );
    }

    let mut dropped = BTreeSet::new();
    for column in instructions.drops_for(name) {
        if live.contains_key(column) && dropped.insert(column.as_str()) {
            plan.push(
                Step::DropColumn {
                    column: column.clone(),
                },
                generator.drop_column(name, column),
            );
        }
    }

    for rename in renames {
        plan.push(
            Step::RenameColumn {
                old: rename.old.clone(),
                new: rename.new.clone(),
            },
            generator.rename_column(name, &rename.old, &rename.new),
        );
    }

    if let Some(pk) = table.primary_key.as_ref().filter(|pk| !pk.is_empty()) {
        if !live.values().any(|c| c.primary_key) {
            let sql = generator.add_primary_key(name, pk).ok_or_else(|| {
                UpgradeError::UnsupportedOperation {
                    dialect: generator.dialect().to_string(),
                    operation: Operation::AddPrimaryKey,
                    table: name.to_string(),
                }
            })?;
            plan.push(Step::AddPrimaryKey { columns: pk.clone() }, sql);
        }
    }

    let mut seen = BTreeSet::new();
    for index in &table.indexes {
        if live_indexes.contains(&index.name) || !seen.insert(index.name.as_str()) {
            continue;
        }
        plan.push(
            Step::CreateIndex {
                index: index.name.clone(),
            },
            generator.create_index(table, index),
        );
    }

    Ok(plan)
}

/// Follows `name` through the later renames of a chain to its final name.
fn chain_end<'a>(name: &'a str, later: &'a [ColumnRename]) -> &'a str {
    later
        .iter()
        .fold(name, |current, rename| {
            if rename.old == current {
                rename.new.as_str()
            } else {
                current
            }
        })
}

/// Decides a rename from the presence of its old and new columns.
///
/// Returns `Ok(true)` when the rename must run and `Ok(false)` when it already
/// happened (or `old == new`).
pub(crate) fn resolve_rename(
    table: &str,
    old: &str,
    new: &str,
    has_old: bool,
    has_new: bool,
) -> Result<bool> {
    if old == new {
        return Ok(false);
    }
    match (has_old, has_new) {
        (true, false) => Ok(true),
        (false, true) => Ok(false),
        (false, false) => Err(UpgradeError::SchemaDrift {
            table: table.to_string(),
            old: old.to_string(),
            new: new.to_string(),
        }),
        (true, true) => Err(UpgradeError::NameCollision {
            table: table.to_string(),
            old: old.to_string(),
            new: new.to_string(),
        }),
    }
}
