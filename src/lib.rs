//! # Tidemark
//!
//! Versioned, reversible database schema migrations for Rust.
//!
//! Tidemark provides:
//! - Migrations written as annotated SQL files or as Rust functions
//! - A reversible schema DSL whose operations undo themselves on rollback
//! - A ledger table recording which versions are applied
//! - Transactional, fail-fast execution with dry runs, timeouts and cancellation
//! - Drivers for SQLite and PostgreSQL
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tidemark::prelude::*;
//! use tidemark::sqlite::SqliteDatabase;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = SqliteDatabase::connect("sqlite://./app.db").await?;
//!     let ledger = db.ledger(DEFAULT_TABLE_NAME);
//!     let migrations = MigrationFileManager::new("./migrations").load().await?;
//!
//!     let engine = MigrationEngine::new(db, ledger, migrations);
//!     let mut run = engine.run(Direction::Up, ExecutionOptions::new()).await?;
//!     while let Some(result) = run.next().await {
//!         println!("{} ok={}", result.migration.full_name(), result.is_success());
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The migration engine.
pub mod migrate {
    pub use tidemark_migrate::*;
}

/// SQLite driver.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use tidemark_sqlite::*;
}

/// PostgreSQL driver.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use tidemark_postgres::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tidemark_migrate::schema::{Column, ColumnType, Index, Table};
    pub use tidemark_migrate::{
        CancellationToken, DEFAULT_TABLE_NAME, Direction, ExecutionOptions, ExecutionResult,
        Migration, MigrationConfig, MigrationContext, MigrationEngine, MigrationError,
        MigrationFileManager, MigrationSet, MigrateResult,
    };
}

// Re-export key types at the crate root
pub use tidemark_migrate::{MigrateResult, MigrationError};
