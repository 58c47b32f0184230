//! Applied-migration ledger.
//!
//! The ledger is a table with one row per applied migration. Drivers read it
//! and create it over their own connection, but every write goes through the
//! executor of the migration transaction so the row lands or vanishes together
//! with the migration itself.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::Executor;
use crate::error::MigrateResult;
use crate::schema::{Column, ColumnType, Table};
use crate::sql::Dialect;

/// Default name of the ledger table.
pub const DEFAULT_TABLE_NAME: &str = "_tidemark_migrations";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Migration version.
    pub version: i64,
    /// Migration name.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

impl MigrationRecord {
    /// Create a record stamped with the current time.
    pub fn new(version: i64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            applied_at: Utc::now(),
        }
    }
}

/// Snapshot of the ledger taken at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerState {
    /// The ledger table does not exist yet.
    FirstRun,
    /// The ledger table exists; records are ordered by version.
    Applied(Vec<MigrationRecord>),
}

impl LedgerState {
    /// Build a state from rows in any order.
    pub fn from_records(mut records: Vec<MigrationRecord>) -> Self {
        records.sort_by_key(|r| r.version);
        Self::Applied(records)
    }

    /// Whether the ledger table is absent.
    pub fn is_first_run(&self) -> bool {
        matches!(self, Self::FirstRun)
    }

    /// Applied records, ascending by version.
    pub fn records(&self) -> &[MigrationRecord] {
        match self {
            Self::FirstRun => &[],
            Self::Applied(records) => records,
        }
    }

    /// Applied versions.
    pub fn versions(&self) -> BTreeSet<i64> {
        self.records().iter().map(|r| r.version).collect()
    }

    /// Look up the record for a version.
    pub fn get(&self, version: i64) -> Option<&MigrationRecord> {
        self.records().iter().find(|r| r.version == version)
    }

    /// Whether a version is applied.
    pub fn contains(&self, version: i64) -> bool {
        self.get(version).is_some()
    }
}

/// Persists applied-migration records for one database.
#[async_trait]
pub trait LedgerDriver: Send + Sync {
    /// Name of the ledger table.
    fn table_name(&self) -> &str;

    /// Create the ledger table if it does not exist.
    async fn create_if_missing(&self) -> MigrateResult<()>;

    /// Read the ledger. A missing table is [`LedgerState::FirstRun`], not an error.
    async fn applied(&self) -> MigrateResult<LedgerState>;

    /// Insert records through the given executor.
    async fn insert(&self, executor: &mut dyn Executor, records: &[MigrationRecord])
    -> MigrateResult<()>;

    /// Delete records by version through the given executor.
    async fn delete(&self, executor: &mut dyn Executor, versions: &[i64]) -> MigrateResult<()>;
}

/// Layout of the ledger table.
pub fn ledger_table(dialect: &dyn Dialect, name: &str) -> Table {
    Table::new(name)
        .column(Column::new("version", ColumnType::BigInt).primary_key())
        .column(Column::new("name", ColumnType::Text))
        .column(Column::new("applied_at", ColumnType::TimestampTz).default(dialect.now()))
        .if_not_exists()
}

/// `CREATE TABLE IF NOT EXISTS` for the ledger.
pub fn create_sql(dialect: &dyn Dialect, table: &str) -> String {
    dialect.create_table(&ledger_table(dialect, table))
}

/// `INSERT` for a batch of records, or `None` when there is nothing to insert.
pub fn insert_sql(dialect: &dyn Dialect, table: &str, records: &[MigrationRecord]) -> Option<String> {
    if records.is_empty() {
        return None;
    }

    let values: Vec<String> = records
        .iter()
        .map(|r| {
            format!(
                "({}, {}, {})",
                r.version,
                dialect.quote_literal(&r.name),
                dialect.timestamp_literal(&r.applied_at)
            )
        })
        .collect();

    Some(format!(
        "INSERT INTO {} (version, name, applied_at) VALUES {}",
        dialect.quote_ident(table),
        values.join(", ")
    ))
}

/// `DELETE` for a batch of versions, or `None` when there is nothing to delete.
pub fn delete_sql(dialect: &dyn Dialect, table: &str, versions: &[i64]) -> Option<String> {
    if versions.is_empty() {
        return None;
    }

    let list: Vec<String> = versions.iter().map(i64::to_string).collect();
    let verb = if dialect.name() == "clickhouse" {
        format!("ALTER TABLE {} DELETE", dialect.quote_ident(table))
    } else {
        format!("DELETE FROM {}", dialect.quote_ident(table))
    };
    Some(format!("{} WHERE version IN ({})", verb, list.join(", ")))
}

/// Parse a stored `applied_at` value.
///
/// Accepts RFC 3339, the offset form written by [`Dialect::timestamp_literal`]
/// and naive `CURRENT_TIMESTAMP` output, which is taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
