//! Error types for the migration engine.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// Requested version is not among the known migrations.
    #[error("Migration version {0} not found")]
    VersionNotFound(i64),

    /// Migration already applied.
    #[error("Migration {0} has already been applied")]
    AlreadyApplied(i64),

    /// Migration is not applied, so it cannot be reverted.
    #[error("Migration {0} has not been applied")]
    NotApplied(i64),

    /// Conflicting or otherwise unusable execution options.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// SQL migration source could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// SQL migration file could not be parsed.
    #[error("Failed to parse {}: {source}", path.display())]
    ParseFile {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: ParseError,
    },

    /// Invalid migration file or format.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    /// Two descriptors share a version.
    #[error("Duplicate migration version {0}")]
    DuplicateVersion(i64),

    /// Unrecoverable condition raised from migration logic. Never absorbed by
    /// the continue-on-error policy.
    #[error("Migration stopped: {0}")]
    ForceStop(String),

    /// The run was cancelled by the caller.
    #[error("Migration run was cancelled")]
    Cancelled,

    /// The run exceeded its deadline.
    #[error("Migration run timed out after {0:?}")]
    Timeout(Duration),

    /// Migration logic panicked.
    #[error("Migration panicked: {0}")]
    Panicked(String),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an invalid options error.
    pub fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(msg.into())
    }

    /// Create a migration file error.
    pub fn migration_file(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create a force-stop error.
    pub fn force_stop(msg: impl Into<String>) -> Self {
        Self::ForceStop(msg.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Errors caused by caller input, reported before the database is touched.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::VersionNotFound(_)
                | Self::AlreadyApplied(_)
                | Self::NotApplied(_)
                | Self::InvalidOptions(_)
        )
    }

    /// Check if this is a parse error.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::ParseFile { .. })
    }

    /// Errors that must halt execution even under a continue-on-error policy.
    pub fn is_force_stop(&self) -> bool {
        matches!(self, Self::ForceStop(_) | Self::Cancelled | Self::Timeout(_))
    }
}

/// Errors produced while parsing a SQL migration file.
///
/// Line numbers are 1-based and refer to the parsed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A quoted literal was still open at end of input.
    #[error("unterminated quoted literal starting on line {line}")]
    UnterminatedLiteral {
        /// Line where the literal was opened.
        line: usize,
    },

    /// A block comment was still open at end of input.
    #[error("unterminated block comment starting on line {line}")]
    UnterminatedComment {
        /// Line where the comment was opened.
        line: usize,
    },

    /// A direction marker line carried an unknown or malformed directive.
    #[error("malformed marker on line {line}: {message}")]
    MalformedMarker {
        /// Line of the marker.
        line: usize,
        /// What was wrong with it.
        message: String,
    },

    /// The file never declares an up section.
    #[error("missing up marker '{marker}'")]
    MissingUpMarker {
        /// The expected marker text.
        marker: String,
    },

    /// A statement block was opened inside another statement block.
    #[error("nested statement block on line {line}")]
    NestedStatementBlock {
        /// Line of the inner begin annotation.
        line: usize,
    },

    /// A statement block was never closed.
    #[error("statement block opened on line {line} is never closed")]
    UnterminatedStatementBlock {
        /// Line of the begin annotation.
        line: usize,
    },

    /// An end annotation appeared with no open block.
    #[error("statement block end on line {line} without a matching begin")]
    UnmatchedStatementEnd {
        /// Line of the end annotation.
        line: usize,
    },
}
