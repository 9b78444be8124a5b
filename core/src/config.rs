//! Upgrade configuration and schema documents.
//!
//! [`UpgradeConfig`] carries everything about a run that is not the desired
//! schema itself: the dialect, rename and drop instructions, generic hooks and
//! SQLite connection settings. [`SchemaDocument`] holds the desired schema.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! dialect: sqlite
//! renames:
//!   users:
//!     - { old: mail, new: email }
//! drops:
//!   users: [legacy_flag]
//! hooks:
//!   legacy_renames:
//!     - { table: posts, old: auther_id, new: author_id }
//!   legacy_tables: [old_sessions]
//!   seeds:
//!     - table: roles
//!       key_column: name
//!       rows:
//!         - { name: admin, level: 10 }
//! sqlite:
//!   busy_timeout_ms: 5000
//!   foreign_keys: true
//! ```

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dialect::Dialect;
use crate::hooks::{DropLegacyTable, GenericHooks, LegacyColumnRename, SeedRows};
use crate::instructions::{ColumnRename, UpgradeInstructions};
use crate::model::Table;

/// Errors raised while reading or writing configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The file extension is neither YAML nor JSON.
    #[error("unsupported schema format: {0}")]
    UnsupportedFormat(String),
}

/// Generic hooks declared in configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    #[serde(default)]
    pub legacy_renames: Vec<LegacyColumnRename>,
    /// Obsolete tables dropped before the upgrade.
    #[serde(default)]
    pub legacy_tables: Vec<String>,
    #[serde(default)]
    pub seeds: Vec<SeedRows>,
}

/// Connection settings for SQLite databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteSettings {
    /// How long a statement waits on a locked database.
    pub busy_timeout_ms: u64,
    /// Whether `PRAGMA foreign_keys` is switched on.
    pub foreign_keys: bool,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

/// Top-level upgrade configuration.
///
/// # Examples
///
/// ```no_run
/// use schema_upgrade_core::UpgradeConfig;
///
/// let config = UpgradeConfig::load("schema-upgrade.yml").unwrap();
/// let instructions = config.instructions();
/// let hooks = config.hooks();
/// println!("{} hooks for {}", hooks.len(), config.dialect);
/// # let _ = instructions;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Configuration format version (e.g., `"1.0"`).
    pub version: String,
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default)]
    pub renames: BTreeMap<String, Vec<ColumnRename>>,
    #[serde(default)]
    pub drops: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub hooks: HookConfig,
    #[serde(default)]
    pub sqlite: SqliteSettings,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            dialect: Dialect::default(),
            renames: BTreeMap::new(),
            drops: BTreeMap::new(),
            hooks: HookConfig::default(),
            sqlite: SqliteSettings::default(),
        }
    }
}

impl UpgradeConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](ConfigError::IoError) if the file cannot be read,
    /// or [`YamlError`](ConfigError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn instructions(&self) -> UpgradeInstructions {
        UpgradeInstructions {
            renames: self.renames.clone(),
            drops: self.drops.clone(),
        }
    }

    /// Builds the configured hooks: legacy renames, then legacy table drops,
    /// then seeds.
    pub fn hooks(&self) -> GenericHooks {
        let mut hooks = GenericHooks::new();
        for rename in &self.hooks.legacy_renames {
            hooks.push(rename.clone());
        }
        for table in &self.hooks.legacy_tables {
            hooks.push(DropLegacyTable::new(table.clone()));
        }
        for seed in &self.hooks.seeds {
            hooks.push(seed.clone());
        }
        hooks
    }
}

/// A desired schema stored as YAML or JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub tables: Vec<Table>,
}

impl SchemaDocument {
    /// Loads a schema, choosing the format from the file extension
    /// (`.yml`, `.yaml` or `.json`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let reader = || -> Result<_, ConfigError> {
            Ok(BufReader::new(std::fs::File::open(path)?))
        };
        let document: Self = match extension.as_str() {
            "yml" | "yaml" => serde_yaml::from_reader(reader()?)?,
            "json" => serde_json::from_reader(reader()?)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };
        Ok(document.adopted())
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let document: Self = serde_yaml::from_str(yaml)?;
        Ok(document.adopted())
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let document: Self = serde_json::from_str(json)?;
        Ok(document.adopted())
    }

    fn adopted(mut self) -> Self {
        for table in &mut self.tables {
            table.adopt_indexes();
        }
        self
    }
}
