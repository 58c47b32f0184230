//! The seam between the engine and a concrete database driver.
//!
//! Drivers implement [`Database`] to hand out transactions. The engine never
//! sees a connection type; everything it runs goes through [`Executor::execute`].

use async_trait::async_trait;

use crate::error::MigrateResult;
use crate::sql::Dialect;

/// Something SQL can be executed against.
#[async_trait]
pub trait Executor: Send {
    /// Execute a single statement.
    async fn execute(&mut self, sql: &str) -> MigrateResult<()>;
}

/// An open database transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) must not leave it open for the next caller:
/// drivers roll back any stale transaction at the next [`Database::begin`].
#[async_trait]
pub trait Transaction: Executor {
    /// Commit the transaction.
    async fn commit(self: Box<Self>) -> MigrateResult<()>;

    /// Roll back the transaction.
    async fn rollback(self: Box<Self>) -> MigrateResult<()>;

    /// View this transaction as a plain executor.
    fn as_executor(&mut self) -> &mut dyn Executor;
}

/// A migration target database.
#[async_trait]
pub trait Database: Send + Sync {
    /// The DDL dialect of this database.
    fn dialect(&self) -> &dyn Dialect;

    /// Begin a new transaction.
    async fn begin(&self) -> MigrateResult<Box<dyn Transaction>>;

    /// An executor that commits every statement on its own.
    ///
    /// Only used for SQL bodies marked `tx=false`.
    async fn autocommit(&self) -> MigrateResult<Box<dyn Executor>>;

    /// Abort the statement currently running, if any.
    ///
    /// Called when a run is cancelled or times out while a statement is in
    /// flight. The aborted statement fails on its own connection; the engine
    /// then rolls back as usual.
    async fn interrupt(&self) {}
}
