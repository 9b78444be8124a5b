//! Explicit column rename and drop instructions.
//!
//! Renames and drops are never inferred from the desired schema: a column the
//! schema does not mention is left alone unless the caller lists it here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One `old -> new` column rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub old: String,
    pub new: String,
}

/// Per-table renames and drops supplied alongside the desired schema.
///
/// # Examples
///
/// ```
/// use schema_upgrade_core::UpgradeInstructions;
///
/// let instructions = UpgradeInstructions::new()
///     .rename("users", "mail", "email")
///     .drop_column("users", "legacy_flag");
///
/// assert_eq!(instructions.renames_for("users")[0].new, "email");
/// assert_eq!(instructions.drops_for("users"), ["legacy_flag"]);
/// assert!(instructions.renames_for("posts").is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeInstructions {
    #[serde(default)]
    pub renames: BTreeMap<String, Vec<ColumnRename>>,
    #[serde(default)]
    pub drops: BTreeMap<String, Vec<String>>,
}

impl UpgradeInstructions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(
        mut self,
        table: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        self.renames
            .entry(table.into())
            .or_default()
            .push(ColumnRename {
                old: old.into(),
                new: new.into(),
            });
        self
    }

    pub fn drop_column(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.drops.entry(table.into()).or_default().push(column.into());
        self
    }

    pub fn renames_for(&self, table: &str) -> &[ColumnRename] {
        self.renames.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn drops_for(&self, table: &str) -> &[String] {
        self.drops.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.values().all(Vec::is_empty) && self.drops.values().all(Vec::is_empty)
    }
}
