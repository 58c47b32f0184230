//! PostgreSQL migration target for Tidemark.
//!
//! PostgreSQL runs DDL inside transactions, so every migration (and its ledger
//! row) either lands completely or not at all.
//!
//! # Example
//!
//! ```rust,ignore
//! use tidemark_migrate::{ExecutionOptions, MigrationEngine, MigrationFileManager};
//! use tidemark_postgres::PgDatabase;
//!
//! let db = PgDatabase::connect_url("postgresql://localhost/app").await?;
//! let ledger = db.ledger("_tidemark_migrations");
//! let migrations = MigrationFileManager::new("./migrations").load().await?;
//!
//! let engine = MigrationEngine::new(db, ledger, migrations);
//! engine.up(ExecutionOptions::new()).await?;
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod ledger;

pub use config::PgConfig;
pub use database::PgDatabase;
pub use error::{PgError, PgResult};
pub use ledger::PgLedger;
