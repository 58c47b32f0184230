//! CLI error types and result alias.

use miette::Diagnostic;
use thiserror::Error;
use tidemark_migrate::MigrationError;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    #[diagnostic(code(tidemark::io))]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    #[diagnostic(code(tidemark::config))]
    Config(String),

    /// Migration error
    #[error("Migration error: {0}")]
    #[diagnostic(code(tidemark::migration))]
    Migration(String),

    /// Database error
    #[error("Database error: {0}")]
    #[diagnostic(code(tidemark::database))]
    Database(String),

    /// One or more migrations failed
    #[error("{0} migration(s) failed")]
    #[diagnostic(code(tidemark::failed), help("fix the failing migration and run the command again"))]
    Failed(usize),
}

impl From<MigrationError> for CliError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Io(e) => CliError::Io(e),
            MigrationError::Database(msg) => CliError::Database(msg),
            other => CliError::Migration(other.to_string()),
        }
    }
}

impl From<tidemark_sqlite::SqliteError> for CliError {
    fn from(err: tidemark_sqlite::SqliteError) -> Self {
        CliError::Database(err.to_string())
    }
}

impl From<tidemark_postgres::PgError> for CliError {
    fn from(err: tidemark_postgres::PgError) -> Self {
        CliError::Database(err.to_string())
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Config(format!("Failed to parse TOML: {}", err))
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        CliError::Config(format!("Failed to serialize TOML: {}", err))
    }
}
