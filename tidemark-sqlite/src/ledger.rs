//! Ledger table stored in SQLite.

use async_trait::async_trait;
use tidemark_migrate::ledger::{self, parse_timestamp};
use tidemark_migrate::{
    Dialect, Executor, LedgerDriver, LedgerState, MigrateResult, MigrationRecord, SqliteDialect,
};
use tokio_rusqlite::Connection;

use crate::database::execute_batch;
use crate::error::{SqliteError, SqliteResult};

/// Applied-migration ledger in a SQLite table.
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Connection,
    table: String,
}

impl SqliteLedger {
    /// Create a ledger over an open connection.
    pub fn new(conn: Connection, table: impl Into<String>) -> Self {
        Self {
            conn,
            table: table.into(),
        }
    }

    async fn read(&self) -> SqliteResult<Option<Vec<(i64, String, String)>>> {
        let table = self.table.clone();
        let select = format!(
            "SELECT version, name, applied_at FROM {} ORDER BY version",
            SqliteDialect.quote_ident(&self.table)
        );

        let rows = self
            .conn
            .call(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                    [&table],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Ok(None);
                }

                let mut stmt = conn.prepare(&select)?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(rows))
            })
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl LedgerDriver for SqliteLedger {
    fn table_name(&self) -> &str {
        &self.table
    }

    async fn create_if_missing(&self) -> MigrateResult<()> {
        let sql = ledger::create_sql(&SqliteDialect, &self.table);
        Ok(execute_batch(&self.conn, &sql).await?)
    }

    async fn applied(&self) -> MigrateResult<LedgerState> {
        let Some(rows) = self.read().await? else {
            return Ok(LedgerState::FirstRun);
        };

        let records = rows
            .into_iter()
            .map(|(version, name, applied_at)| {
                let applied_at = parse_timestamp(&applied_at).ok_or_else(|| {
                    SqliteError::decode(format!(
                        "invalid applied_at '{}' for version {}",
                        applied_at, version
                    ))
                })?;
                Ok(MigrationRecord {
                    version,
                    name,
                    applied_at,
                })
            })
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(LedgerState::from_records(records))
    }

    async fn insert(
        &self,
        executor: &mut dyn Executor,
        records: &[MigrationRecord],
    ) -> MigrateResult<()> {
        match ledger::insert_sql(&SqliteDialect, &self.table, records) {
            Some(sql) => executor.execute(&sql).await,
            None => Ok(()),
        }
    }

    async fn delete(&self, executor: &mut dyn Executor, versions: &[i64]) -> MigrateResult<()> {
        match ledger::delete_sql(&SqliteDialect, &self.table, versions) {
            Some(sql) => executor.execute(&sql).await,
            None => Ok(()),
        }
    }
}
