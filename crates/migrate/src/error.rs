//! Error types for the migration engine
//!
//! Every engine operation returns [`MigrateResult`]. A failure is always a
//! distinct value from a legitimate zero count or empty list, and a batch that
//! stops partway still carries the progress it made (see
//! [`MigrationError::Halted`]).

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::dialect::Dialect;
use crate::migration::Direction;
use crate::migrator::BatchReport;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Missing or invalid configuration; raised before any connection is made
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cannot reach or authenticate to the backend
    #[error("Connection error ({dialect}): {message}")]
    Connection { dialect: Dialect, message: String },

    /// Generic database error from the driver
    #[error("Database error: {0}")]
    Database(String),

    /// The migrations directory for this dialect and database does not exist
    #[error("Migrations directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// A migration directory lacks the script needed for this direction
    #[error("Migration {id} has no {direction} script at {}", .path.display())]
    MissingScript {
        id: String,
        direction: Direction,
        path: PathBuf,
    },

    /// A script failed; its transaction was rolled back
    #[error("Migration {id} failed while running {direction}: {message}")]
    ScriptFailed {
        id: String,
        direction: Direction,
        message: String,
    },

    /// Reading or writing the ledger table failed
    #[error("Ledger {operation} failed: {message}")]
    Ledger {
        operation: &'static str,
        message: String,
    },

    /// A migration directory with this id already exists
    #[error("Migration already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Migration name cannot be turned into a directory name
    #[error("Invalid migration name '{0}': use letters, digits, spaces, hyphens or underscores")]
    InvalidName(String),

    /// Database name cannot be used as an identifier
    #[error("Invalid database name '{0}'")]
    InvalidDatabaseName(String),

    /// The ledger references a migration that is not on disk
    #[error("Migration {0} is recorded in the ledger but was not found on disk")]
    UnknownMigration(String),

    /// There is no migration after the last one that ran, or nothing ran yet
    #[error("{}", no_next_message(.0))]
    NoNextMigration(Option<String>),

    /// Repair: migration has already been applied or does not exist
    #[error("Migration {0} is not pending")]
    NotPending(String),

    /// Repair: migration is not recorded in the ledger
    #[error("Migration {0} has not been run")]
    NotRan(String),

    /// Another process holds the migration lock
    #[error("Timed out after {seconds}s waiting for the migration lock on '{database}'")]
    LockTimeout { database: String, seconds: u64 },

    /// A batch stopped at `failed`; `report` holds the migrations completed before it
    #[error("Migrating {direction} halted at {failed} after {} completed migration(s): {source}", .report.count())]
    Halted {
        direction: Direction,
        failed: String,
        report: BatchReport,
        #[source]
        source: Box<MigrationError>,
    },

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn no_next_message(last: &Option<String>) -> String {
    match last {
        Some(last) => format!("There is no migration after {}", last),
        None => "No migration has run yet, so there is no next one".to_string(),
    }
}

impl MigrationError {
    /// Progress made by a batch before it halted, if this error is a halt
    pub fn partial_report(&self) -> Option<&BatchReport> {
        match self {
            MigrationError::Halted { report, .. } => Some(report),
            _ => None,
        }
    }

    /// The underlying fault, looking through a batch halt
    pub fn root_cause(&self) -> &MigrationError {
        match self {
            MigrationError::Halted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the ledger may disagree with the schema and needs a manual repair
    pub fn needs_repair(&self) -> bool {
        matches!(self.root_cause(), MigrationError::Ledger { .. })
    }

    pub(crate) fn ledger(operation: &'static str, err: impl std::fmt::Display) -> Self {
        MigrationError::Ledger {
            operation,
            message: err.to_string(),
        }
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halted_exposes_report_and_cause() {
        let mut report = BatchReport::new(Direction::Up);
        report.completed.push("20240101000000_a".to_string());

        let err = MigrationError::Halted {
            direction: Direction::Up,
            failed: "20240102000000_b".to_string(),
            report,
            source: Box::new(MigrationError::ledger("insert", "disk full")),
        };

        assert_eq!(err.partial_report().map(|r| r.count()), Some(1));
        assert!(matches!(err.root_cause(), MigrationError::Ledger { .. }));
        assert!(err.needs_repair());

        let message = err.to_string();
        assert!(message.contains("halted at 20240102000000_b"));
        assert!(message.contains("after 1 completed"));
    }

    #[test]
    fn test_script_failure_does_not_need_repair() {
        let err = MigrationError::ScriptFailed {
            id: "20240101000000_a".to_string(),
            direction: Direction::Down,
            message: "syntax error".to_string(),
        };

        assert!(!err.needs_repair());
        assert!(err.partial_report().is_none());
        assert_eq!(
            err.to_string(),
            "Migration 20240101000000_a failed while running down: syntax error"
        );
    }

    #[test]
    fn test_no_next_message() {
        assert_eq!(
            MigrationError::NoNextMigration(None).to_string(),
            "No migration has run yet, so there is no next one"
        );
        assert_eq!(
            MigrationError::NoNextMigration(Some("20240101000000_a".into())).to_string(),
            "There is no migration after 20240101000000_a"
        );
    }
}
