//! Error types for PostgreSQL operations.

use thiserror::Error;
use tidemark_migrate::MigrationError;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur during PostgreSQL operations.
#[derive(Error, Debug)]
pub enum PgError {
    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Postgres(e) => e.is_closed(),
            Self::Config(_) => false,
        }
    }

    /// The SQLSTATE code reported by the server, if any.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Postgres(e) => e.code().map(|code| code.code()),
            _ => None,
        }
    }
}

impl From<PgError> for MigrationError {
    fn from(err: PgError) -> Self {
        let message = match &err {
            PgError::Postgres(e) => match e.as_db_error() {
                Some(db) => format!("postgres error {}: {}", db.code().code(), db.message()),
                None => err.to_string(),
            },
            _ => err.to_string(),
        };
        MigrationError::database(message)
    }
}
