//! Ledger table stored in PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tidemark_migrate::ledger;
use tidemark_migrate::{
    Dialect, Executor, LedgerDriver, LedgerState, MigrateResult, MigrationRecord, PostgresDialect,
};

use crate::database::PgDatabase;
use crate::error::{PgError, PgResult};

/// Applied-migration ledger in a table of the current schema.
#[derive(Clone)]
pub struct PgLedger {
    db: PgDatabase,
    table: String,
}

impl PgLedger {
    /// Create a ledger over a connected database.
    pub fn new(db: PgDatabase, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    async fn read(&self) -> PgResult<Option<Vec<MigrationRecord>>> {
        let client = self.db.acquire().await?;

        let table = PostgresDialect.quote_ident(&self.table);

        let exists_sql = format!(
            "SELECT to_regclass({}) IS NOT NULL",
            PostgresDialect.quote_literal(&table)
        );
        let exists: bool = client.query_one(&exists_sql, &[]).await?.try_get(0)?;
        if !exists {
            return Ok(None);
        }

        let sql = format!(
            "SELECT version, name, applied_at FROM {} ORDER BY version",
            table
        );
        let records = client
            .query(&sql, &[])
            .await?
            .iter()
            .map(|row| -> PgResult<MigrationRecord> {
                let applied_at: DateTime<Utc> = row.try_get(2)?;
                Ok(MigrationRecord {
                    version: row.try_get(0)?,
                    name: row.try_get(1)?,
                    applied_at,
                })
            })
            .collect::<PgResult<Vec<_>>>()?;

        Ok(Some(records))
    }
}

#[async_trait]
impl LedgerDriver for PgLedger {
    fn table_name(&self) -> &str {
        &self.table
    }

    async fn create_if_missing(&self) -> MigrateResult<()> {
        let sql = ledger::create_sql(&PostgresDialect, &self.table);
        let client = self.db.acquire().await?;
        client.batch_execute(&sql).await.map_err(PgError::from)?;
        Ok(())
    }

    async fn applied(&self) -> MigrateResult<LedgerState> {
        Ok(match self.read().await? {
            Some(records) => LedgerState::from_records(records),
            None => LedgerState::FirstRun,
        })
    }

    async fn insert(
        &self,
        executor: &mut dyn Executor,
        records: &[MigrationRecord],
    ) -> MigrateResult<()> {
        match ledger::insert_sql(&PostgresDialect, &self.table, records) {
            Some(sql) => executor.execute(&sql).await,
            None => Ok(()),
        }
    }

    async fn delete(&self, executor: &mut dyn Executor, versions: &[i64]) -> MigrateResult<()> {
        match ledger::delete_sql(&PostgresDialect, &self.table, versions) {
            Some(sql) => executor.execute(&sql).await,
            None => Ok(()),
        }
    }
}
