//! SQLite migration target for Tidemark.
//!
//! This crate runs migrations against SQLite using `tokio-rusqlite` for
//! asynchronous access.
//!
//! # Features
//!
//! - [`Database`](tidemark_migrate::Database) implementation with real
//!   `BEGIN`/`COMMIT` transactions, so DDL rolls back on failure
//! - A ledger table stored in the same database
//! - In-memory and file-based databases
//!
//! # Example
//!
//! ```rust,ignore
//! use tidemark_migrate::{ExecutionOptions, MigrationEngine, MigrationFileManager};
//! use tidemark_sqlite::SqliteDatabase;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = SqliteDatabase::connect("sqlite://./app.db").await?;
//!     let ledger = db.ledger("_tidemark_migrations");
//!     let migrations = MigrationFileManager::new("./migrations").load().await?;
//!
//!     let engine = MigrationEngine::new(db, ledger, migrations);
//!     for result in engine.up(ExecutionOptions::new()).await? {
//!         println!("{}: {}", result.migration.full_name(), result.is_success());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod ledger;

pub use config::{DatabasePath, JournalMode, SqliteConfig};
pub use database::SqliteDatabase;
pub use error::{SqliteError, SqliteResult};
pub use ledger::SqliteLedger;
