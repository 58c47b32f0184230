//! # tidemark-migrate
//!
//! The migration engine behind Tidemark.
//!
//! This crate provides:
//! - Migration descriptors written as SQL files or Rust functions
//! - A SQL file parser that splits files into per-direction statements
//! - A reversible schema DSL whose operations invert themselves on rollback
//! - Version resolution against a persisted ledger of applied migrations
//! - Transactional, fail-fast execution with dry runs, timeouts and cancellation
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────┐
//! │ Migrations   │────▶│ Resolver       │◀────│ Ledger      │
//! └──────────────┘     └────────────────┘     └─────────────┘
//!                              │                     ▲
//!                              ▼                     │
//!                      ┌────────────────┐     ┌─────────────┐
//!                      │ Engine (run)   │────▶│ Transaction │
//!                      └────────────────┘     └─────────────┘
//! ```
//!
//! Database drivers plug in through [`Database`] and [`LedgerDriver`]; see the
//! `tidemark-sqlite` and `tidemark-postgres` crates.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidemark_migrate::{ExecutionOptions, Migration, MigrationEngine, MigrationSet};
//! use tidemark_migrate::schema::{Column, ColumnType, Table};
//!
//! let migrations = MigrationSet::new(vec![
//!     Migration::change(20240101120000, "create_users", |ctx| {
//!         Box::pin(async move {
//!             let users = Table::new("users")
//!                 .column(Column::new("id", ColumnType::BigInt).primary_key())
//!                 .column(Column::new("email", ColumnType::Text).unique());
//!             ctx.create_table(&users).await
//!         })
//!     }),
//! ])?;
//!
//! let engine = MigrationEngine::new(db, ledger, migrations);
//!
//! let mut run = engine.run(Direction::Up, ExecutionOptions::new()).await?;
//! while let Some(result) = run.next().await {
//!     println!("{} {}", result.migration.full_name(), result.is_success());
//! }
//! ```
//!
//! ## Migration Files
//!
//! ```sql
//! -- migrate:up
//! CREATE TABLE posts (id BIGINT PRIMARY KEY, body TEXT);
//!
//! -- tidemark:statement:begin
//! CREATE FUNCTION touch() RETURNS trigger AS $$
//! BEGIN NEW.updated_at = now(); RETURN NEW; END;
//! $$ LANGUAGE plpgsql;
//! -- tidemark:statement:end
//!
//! -- migrate:down tx=false
//! DROP TABLE posts;
//! ```

pub mod context;
pub mod database;
pub mod direction;
pub mod engine;
pub mod error;
pub mod file;
pub mod ledger;
pub mod migration;
pub mod parser;
pub mod resolver;
pub mod schema;
pub mod sql;

pub use context::MigrationContext;
pub use database::{Database, Executor, Transaction};
pub use direction::Direction;
pub use engine::{ExecutionOptions, ExecutionResult, MigrationConfig, MigrationEngine, MigrationRun};
pub use error::{MigrateResult, MigrationError, ParseError};
pub use file::MigrationFileManager;
pub use ledger::{DEFAULT_TABLE_NAME, LedgerDriver, LedgerState, MigrationRecord};
pub use migration::{
    Migration, MigrationBody, MigrationFn, MigrationSet, MigrationStatus, SqlBody, SqlMigration,
};
pub use parser::{Markers, ParsedMigration, parse, split_statements};
pub use schema::{Column, ColumnType, Index, Table};
pub use sql::{ClickHouseDialect, Dialect, PostgresDialect, SqliteDialect};

pub use tokio_util::sync::CancellationToken;
