//! Error types for schema upgrades.
//!
//! Every variant carries the table and, where one applies, the column or index
//! involved, so a failed run can be acted on without re-running it verbosely.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a [`Connection`](crate::Connection) implementation.
pub type PortError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The kind of structural operation an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateTable,
    CreateIndex,
    AddColumn,
    DropColumn,
    RenameColumn,
    AddPrimaryKey,
    DropTable,
    /// A statement issued directly by a hook.
    Statement,
    /// Opening or closing the per-table unit of work.
    Transaction,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CreateTable => "create table",
            Self::CreateIndex => "create index",
            Self::AddColumn => "add column",
            Self::DropColumn => "drop column",
            Self::RenameColumn => "rename column",
            Self::AddPrimaryKey => "add primary key",
            Self::DropTable => "drop table",
            Self::Statement => "execute statement on",
            Self::Transaction => "commit changes to",
        };
        f.write_str(label)
    }
}

/// Upgrade lifecycle phase in which hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Before any table is processed.
    Before,
    /// After every table reached `DONE`.
    After,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before => f.write_str("before"),
            Self::After => f.write_str("after"),
        }
    }
}

/// A hook that failed during its phase.
#[derive(Debug)]
pub struct HookFailure {
    pub hook: String,
    pub error: UpgradeError,
}

/// Errors that can occur while upgrading a schema.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// A metadata lookup against the live database failed.
    #[error("could not introspect table '{table}': {source}")]
    Introspection {
        table: String,
        #[source]
        source: PortError,
    },

    /// A DDL (or hook) statement failed.
    #[error("could not {operation} {}: {source}", target_label(.table, .object))]
    Execution {
        operation: Operation,
        table: String,
        /// Column or index name, when the operation targets one.
        object: Option<String>,
        #[source]
        source: PortError,
    },

    /// The dialect cannot perform the requested structural change.
    #[error("{operation} on table '{table}' is not supported by {dialect}")]
    UnsupportedOperation {
        dialect: String,
        operation: Operation,
        table: String,
    },

    /// Neither the old nor the new column of a rename exists.
    #[error("could not rename column '{old}' on table '{table}' to '{new}': old and new columns are missing")]
    SchemaDrift {
        table: String,
        old: String,
        new: String,
    },

    /// The rename target exists while the old column is still present.
    #[error("could not rename column '{old}' on table '{table}' to '{new}': new column already exists")]
    NameCollision {
        table: String,
        old: String,
        new: String,
    },

    /// The instructions both drop a column and rename it.
    #[error("column '{column}' on table '{table}' is listed as both dropped and renamed")]
    ConflictingInstructions { table: String, column: String },

    /// One or more hooks of a phase failed.
    #[error("{} {phase} hook(s) failed: {}", .failures.len(), hook_names(.failures))]
    Hooks {
        phase: Phase,
        failures: Vec<HookFailure>,
    },

    /// The run was cancelled before the next statement.
    #[error("upgrade cancelled")]
    Cancelled,
}

impl UpgradeError {
    pub(crate) fn introspection(table: impl Into<String>, source: PortError) -> Self {
        Self::Introspection {
            table: table.into(),
            source,
        }
    }

    pub(crate) fn execution(
        operation: Operation,
        table: impl Into<String>,
        object: Option<&str>,
        source: PortError,
    ) -> Self {
        Self::Execution {
            operation,
            table: table.into(),
            object: object.map(str::to_string),
            source,
        }
    }

    /// Returns the table the error is attached to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Introspection { table, .. }
            | Self::Execution { table, .. }
            | Self::UnsupportedOperation { table, .. }
            | Self::SchemaDrift { table, .. }
            | Self::NameCollision { table, .. }
            | Self::ConflictingInstructions { table, .. } => Some(table),
            Self::Hooks { .. } | Self::Cancelled => None,
        }
    }

    /// Format error with full details including the source chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {self}\n");

        if let Self::Hooks { failures, .. } = self {
            for failure in failures {
                output.push_str(&format!("\n  hook '{}': {}", failure.hook, failure.error));
            }
        }

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {depth}: {err}"));
            source = err.source();
            depth += 1;
        }

        output
    }
}

fn target_label(table: &str, object: &Option<String>) -> String {
    match object {
        Some(name) => format!("'{name}' on table '{table}'"),
        None => format!("'{table}'"),
    }
}

fn hook_names(failures: &[HookFailure]) -> String {
    failures
        .iter()
        .map(|f| f.hook.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias for results with [`UpgradeError`].
pub type Result<T> = std::result::Result<T, UpgradeError>;
