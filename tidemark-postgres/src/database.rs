//! PostgreSQL migration target.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tidemark_migrate::{Database, Dialect, Executor, MigrateResult, PostgresDialect, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_postgres::{CancelToken, Client, NoTls};
use tracing::{debug, error, info, warn};

use crate::config::PgConfig;
use crate::error::{PgError, PgResult};
use crate::ledger::PgLedger;

/// A PostgreSQL database, driven over a single client.
///
/// A transaction holds the client lock until it commits or rolls back. If it
/// is dropped while open, the next user of the client rolls it back first.
#[derive(Clone)]
pub struct PgDatabase {
    client: Arc<Mutex<Client>>,
    cancel: CancelToken,
    abandoned: Arc<AtomicBool>,
    config: Arc<PgConfig>,
}

impl PgDatabase {
    /// Connect with the given configuration.
    pub async fn connect(config: PgConfig) -> PgResult<Self> {
        let (client, connection) = config
            .to_pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| PgError::connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed");
            }
        });

        info!(
            host = %config.host,
            port = %config.port,
            database = %config.database,
            "connected to PostgreSQL"
        );

        Ok(Self {
            cancel: client.cancel_token(),
            client: Arc::new(Mutex::new(client)),
            abandoned: Arc::new(AtomicBool::new(false)),
            config: Arc::new(config),
        })
    }

    /// Connect from a URL.
    pub async fn connect_url(url: &str) -> PgResult<Self> {
        Self::connect(PgConfig::from_url(url)?).await
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &PgConfig {
        &self.config
    }

    /// A ledger stored in this database.
    pub fn ledger(&self, table: impl Into<String>) -> PgLedger {
        PgLedger::new(self.clone(), table)
    }

    /// Lock the client, cleaning up after an abandoned transaction.
    pub(crate) async fn acquire(&self) -> PgResult<OwnedMutexGuard<Client>> {
        let client = self.client.clone().lock_owned().await;
        if self.abandoned.swap(false, Ordering::AcqRel) {
            warn!("rolling back a transaction left open by an interrupted migration");
            client.batch_execute("ROLLBACK").await?;
        }
        Ok(client)
    }
}

async fn batch_execute(client: &Client, sql: &str) -> PgResult<()> {
    debug!(sql = %sql, "executing");
    client.batch_execute(sql).await?;
    Ok(())
}

#[async_trait]
impl Database for PgDatabase {
    fn dialect(&self) -> &dyn Dialect {
        &PostgresDialect
    }

    async fn begin(&self) -> MigrateResult<Box<dyn Transaction>> {
        let client = self.acquire().await?;
        batch_execute(&client, "BEGIN").await?;
        Ok(Box::new(PgTransaction {
            client,
            abandoned: self.abandoned.clone(),
            finished: false,
        }))
    }

    async fn autocommit(&self) -> MigrateResult<Box<dyn Executor>> {
        Ok(Box::new(PgAutocommit { db: self.clone() }))
    }

    /// Sends a cancel request for whatever the backend is running.
    async fn interrupt(&self) {
        debug!("cancelling PostgreSQL query");
        if let Err(e) = self.cancel.cancel_query(NoTls).await {
            warn!(error = %e, "failed to cancel running query");
        }
    }
}

/// An open `BEGIN` ... `COMMIT` block holding the client lock.
struct PgTransaction {
    client: OwnedMutexGuard<Client>,
    abandoned: Arc<AtomicBool>,
    finished: bool,
}

#[async_trait]
impl Executor for PgTransaction {
    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        Ok(batch_execute(&self.client, sql).await?)
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(mut self: Box<Self>) -> MigrateResult<()> {
        self.finished = true;
        Ok(batch_execute(&self.client, "COMMIT").await?)
    }

    async fn rollback(mut self: Box<Self>) -> MigrateResult<()> {
        self.finished = true;
        Ok(batch_execute(&self.client, "ROLLBACK").await?)
    }

    fn as_executor(&mut self) -> &mut dyn Executor {
        self
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.abandoned.store(true, Ordering::Release);
        }
    }
}

/// Executes statements outside any transaction.
struct PgAutocommit {
    db: PgDatabase,
}

#[async_trait]
impl Executor for PgAutocommit {
    async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
        let client = self.db.acquire().await?;
        Ok(batch_execute(&client, sql).await?)
    }
}
