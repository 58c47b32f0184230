//! The context handed to migration bodies.
//!
//! A [`MigrationContext`] carries the executor of the open transaction and the
//! direction the body runs in. Structural operations consult the direction:
//! going up they do what they say, going down they perform their inverse.
//! Inverses always run literally, so an operation never inverts twice.

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::database::Executor;
use crate::direction::{Direction, Dispatch, Mode, dispatch, reversible_branch};
use crate::error::MigrateResult;
use crate::schema::{Column, Index, Table};
use crate::sql::Dialect;

/// Execution context of a single migration body.
pub struct MigrationContext<'a> {
    executor: &'a mut dyn Executor,
    dialect: &'a dyn Dialect,
    mode: Mode,
    continue_on_error: bool,
    warnings: &'a mut Vec<String>,
}

impl<'a> MigrationContext<'a> {
    pub(crate) fn new(
        executor: &'a mut dyn Executor,
        dialect: &'a dyn Dialect,
        mode: Mode,
        continue_on_error: bool,
        warnings: &'a mut Vec<String>,
    ) -> Self {
        Self {
            executor,
            dialect,
            mode,
            continue_on_error,
            warnings,
        }
    }

    /// Reborrow into a child context running in `mode`.
    pub(crate) fn scoped(&mut self, mode: Mode) -> MigrationContext<'_> {
        MigrationContext {
            executor: &mut *self.executor,
            dialect: self.dialect,
            mode,
            continue_on_error: self.continue_on_error,
            warnings: &mut *self.warnings,
        }
    }

    /// The direction structural operations follow, or `None` when they run
    /// literally.
    pub fn direction(&self) -> Option<Direction> {
        reversible_branch(self.mode)
    }

    /// The dialect of the target database.
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect
    }

    /// Warnings recorded so far.
    pub fn warnings(&self) -> &[String] {
        self.warnings
    }

    /// Record a non-fatal warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(message = %message, "migration warning");
        self.warnings.push(message);
    }

    /// Execute raw SQL.
    ///
    /// Raw SQL has no known inverse: while reverting a `change` body it is
    /// skipped with a warning.
    pub async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        if self.mode == Mode::Down {
            self.warn(format!("cannot revert raw SQL, skipped: {}", sql));
            return Ok(());
        }
        self.run(sql.to_string()).await
    }

    /// Create a table. Reverting drops it.
    pub async fn create_table(&mut self, table: &Table) -> MigrateResult<()> {
        let sql = match dispatch(self.mode) {
            Dispatch::Literal => self.dialect.create_table(table),
            Dispatch::Invert => self.dialect.drop_table(&table.name),
        };
        self.run(sql).await
    }

    /// Drop a table. Reverting recreates it from `reversible`, when given.
    pub async fn drop_table(&mut self, name: &str, reversible: Option<&Table>) -> MigrateResult<()> {
        let sql = match (dispatch(self.mode), reversible) {
            (Dispatch::Literal, _) => self.dialect.drop_table(name),
            (Dispatch::Invert, Some(table)) => self.dialect.create_table(table),
            (Dispatch::Invert, None) => {
                self.warn(format!("cannot recreate dropped table '{}': no definition given", name));
                return Ok(());
            }
        };
        self.run(sql).await
    }

    /// Add a column. Reverting drops it.
    pub async fn add_column(&mut self, table: &str, column: &Column) -> MigrateResult<()> {
        let sql = match dispatch(self.mode) {
            Dispatch::Literal => self.dialect.add_column(table, column),
            Dispatch::Invert => self.dialect.drop_column(table, &column.name),
        };
        self.run(sql).await
    }

    /// Drop a column. Reverting re-adds it from `reversible`, when given.
    pub async fn drop_column(
        &mut self,
        table: &str,
        column: &str,
        reversible: Option<&Column>,
    ) -> MigrateResult<()> {
        let sql = match (dispatch(self.mode), reversible) {
            (Dispatch::Literal, _) => self.dialect.drop_column(table, column),
            (Dispatch::Invert, Some(def)) => self.dialect.add_column(table, def),
            (Dispatch::Invert, None) => {
                self.warn(format!(
                    "cannot re-add dropped column '{}.{}': no definition given",
                    table, column
                ));
                return Ok(());
            }
        };
        self.run(sql).await
    }

    /// Create an index. Reverting drops it.
    pub async fn create_index(&mut self, index: &Index) -> MigrateResult<()> {
        let sql = match dispatch(self.mode) {
            Dispatch::Literal => self.dialect.create_index(index),
            Dispatch::Invert => self.dialect.drop_index(&index.name, &index.table),
        };
        self.run(sql).await
    }

    /// Drop an index. Reverting recreates it from `reversible`, when given.
    pub async fn drop_index(
        &mut self,
        table: &str,
        name: &str,
        reversible: Option<&Index>,
    ) -> MigrateResult<()> {
        let sql = match (dispatch(self.mode), reversible) {
            (Dispatch::Literal, _) => self.dialect.drop_index(name, table),
            (Dispatch::Invert, Some(index)) => self.dialect.create_index(index),
            (Dispatch::Invert, None) => {
                self.warn(format!("cannot recreate dropped index '{}': no definition given", name));
                return Ok(());
            }
        };
        self.run(sql).await
    }

    /// Rename a table. Reverting renames it back.
    pub async fn rename_table(&mut self, from: &str, to: &str) -> MigrateResult<()> {
        let sql = match dispatch(self.mode) {
            Dispatch::Literal => self.dialect.rename_table(from, to),
            Dispatch::Invert => self.dialect.rename_table(to, from),
        };
        self.run(sql).await
    }

    /// Rename a column. Reverting renames it back.
    pub async fn rename_column(&mut self, table: &str, from: &str, to: &str) -> MigrateResult<()> {
        let sql = match dispatch(self.mode) {
            Dispatch::Literal => self.dialect.rename_column(table, from, to),
            Dispatch::Invert => self.dialect.rename_column(table, to, from),
        };
        self.run(sql).await
    }

    /// Run `up` when applying and `down` when reverting.
    ///
    /// Both callbacks get a context whose operations run literally. Entered
    /// from such a context, neither callback runs.
    ///
    /// ```rust,ignore
    /// ctx.reversible(
    ///     |ctx| Box::pin(async move { ctx.execute("INSERT INTO roles VALUES ('admin')").await }),
    ///     |ctx| Box::pin(async move { ctx.execute("DELETE FROM roles WHERE name = 'admin'").await }),
    /// )
    /// .await?;
    /// ```
    pub async fn reversible<U, D>(&mut self, up: U, down: D) -> MigrateResult<()>
    where
        U: for<'s, 'c> FnOnce(&'s mut MigrationContext<'c>) -> BoxFuture<'s, MigrateResult<()>>
            + Send,
        D: for<'s, 'c> FnOnce(&'s mut MigrationContext<'c>) -> BoxFuture<'s, MigrateResult<()>>
            + Send,
    {
        let Some(direction) = reversible_branch(self.mode) else {
            self.warn("reversible block entered from a non-reversible context, skipped");
            return Ok(());
        };

        let mut scope = self.scoped(Mode::NotReversible);
        match direction {
            Direction::Up => up(&mut scope).await,
            Direction::Down => down(&mut scope).await,
        }
    }

    async fn run(&mut self, sql: String) -> MigrateResult<()> {
        debug!(sql = %sql, "executing statement");
        let result = self.executor.execute(&sql).await;
        self.absorb(result)
    }

    /// Apply the continue-on-error policy to a statement result.
    fn absorb(&mut self, result: MigrateResult<()>) -> MigrateResult<()> {
        match result {
            Err(err) if self.continue_on_error && !err.is_force_stop() => {
                self.warn(format!("continuing after error: {}", err));
                Ok(())
            }
            other => other,
        }
    }
}
