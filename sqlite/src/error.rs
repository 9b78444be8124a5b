//! Error types for the SQLite binding.

use schema_upgrade_core::UpgradeError;
use thiserror::Error;

/// Errors that can occur while opening or upgrading a SQLite database.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite failure outside an upgrade step (opening, configuring, counting).
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// The upgrade itself failed.
    #[error(transparent)]
    UpgradeError(#[from] UpgradeError),
}

impl SqliteError {
    /// Format error with full details including the source chain.
    pub fn format_detailed(&self) -> String {
        match self {
            Self::UpgradeError(err) => err.format_detailed(),
            Self::DatabaseError(err) => format!("Error: database error: {err}"),
        }
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
