//! SQLite migration target.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::InterruptHandle;
use tidemark_migrate::{Database, Dialect, Executor, MigrateResult, SqliteDialect, Transaction};
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::config::{DatabasePath, SqliteConfig};
use crate::error::{SqliteError, SqliteResult};
use crate::ledger::SqliteLedger;

/// A SQLite database, driven over a single connection.
///
/// Migrations run strictly one after another, so one connection is enough.
/// The ledger shares it, which keeps in-memory databases consistent.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Connection,
    interrupt: Arc<InterruptHandle>,
    config: SqliteConfig,
}

impl SqliteDatabase {
    /// Open a database with the given configuration.
    pub async fn open(config: SqliteConfig) -> SqliteResult<Self> {
        let conn = match &config.path {
            DatabasePath::Memory => Connection::open_in_memory().await?,
            DatabasePath::File(path) => Connection::open(path).await?,
        };

        let init_sql = config.init_sql();
        let interrupt = conn
            .call(move |conn| {
                conn.execute_batch(&init_sql)?;
                Ok(conn.get_interrupt_handle())
            })
            .await?;

        debug!(path = ?config.path, "opened SQLite database");
        Ok(Self {
            conn,
            interrupt: Arc::new(interrupt),
            config,
        })
    }

    /// Open a database from a URL.
    pub async fn connect(url: &str) -> SqliteResult<Self> {
        Self::open(SqliteConfig::from_url(url)?).await
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// A ledger stored in this database.
    pub fn ledger(&self, table: impl Into<String>) -> SqliteLedger {
        SqliteLedger::new(self.conn.clone(), table)
    }
}

/// Execute one or more statements on the connection.
pub(crate) async fn execute_batch(conn: &Connection, sql: &str) -> SqliteResult<()> {
    let sql = sql.to_string();
    debug!(sql = %sql, "executing");

    conn.call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
    })
    .await?;
    Ok(())
}

#[async_trait]
impl Database for SqliteDatabase {
    fn dialect(&self) -> &dyn Dialect {
        &SqliteDialect
    }

    async fn begin(&self) -> MigrateResult<Box<dyn Transaction>> {
        let stale = self
            .conn
            .call(|conn| Ok(!conn.is_autocommit()))
            .await
            .map_err(SqliteError::from)?;
        if stale {
            warn!("rolling back a transaction left open by an interrupted migration");
            execute_batch(&self.conn, "ROLLBACK").await?;
        }

        execute_batch(&self.conn, "BEGIN").await?;
        Ok(Box::new(SqliteTransaction {
            conn: self.conn.clone(),
            finished: false,
        }))
    }

    async fn autocommit(&self) -> MigrateResult<Box<dyn Executor>> {
        Ok(Box::new(SqliteAutocommit {
            conn: self.conn.clone(),
        }))
    }

    async fn interrupt(&self) {
        debug!("interrupting SQLite statement");
        self.interrupt.interrupt();
    }
}

/// An open `BEGIN` ... `COMMIT` block.
struct SqliteTransaction {
    conn: Connection,
    finished: bool,
}

#[async_trait]
impl Executor for SqliteTransaction {
    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        Ok(execute_batch(&self.conn, sql).await?)
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(mut self: Box<Self>) -> MigrateResult<()> {
        self.finished = true;
        Ok(execute_batch(&self.conn, "COMMIT").await?)
    }

    async fn rollback(mut self: Box<Self>) -> MigrateResult<()> {
        self.finished = true;
        Ok(execute_batch(&self.conn, "ROLLBACK").await?)
    }

    fn as_executor(&mut self) -> &mut dyn Executor {
        self
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            debug!("transaction dropped while open, it is rolled back at the next begin");
        }
    }
}

/// Executes statements outside any transaction.
struct SqliteAutocommit {
    conn: Connection,
}

#[async_trait]
impl Executor for SqliteAutocommit {
    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        Ok(execute_batch(&self.conn, sql).await?)
    }
}
