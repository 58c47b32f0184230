//! Migration descriptors.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::context::MigrationContext;
use crate::direction::{Direction, Mode};
use crate::error::{MigrateResult, MigrationError, ParseError};
use crate::parser::{self, Markers};

/// Migration logic written in Rust.
///
/// Implemented for closures of the shape
/// `|ctx| Box::pin(async move { ... })`, and for any type that wants to carry
/// its own state.
#[async_trait]
pub trait MigrationFn: Send + Sync {
    /// Run against the given context.
    async fn call(&self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()>;
}

#[async_trait]
impl<F> MigrationFn for F
where
    F: for<'s, 'c> Fn(&'s mut MigrationContext<'c>) -> BoxFuture<'s, MigrateResult<()>> + Send + Sync,
{
    async fn call(&self, ctx: &mut MigrationContext<'_>) -> MigrateResult<()> {
        (self)(ctx).await
    }
}

/// One direction of a SQL migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlBody {
    /// Statements in execution order.
    pub statements: Vec<String>,
    /// Whether the statements run inside a transaction.
    pub transactional: bool,
}

impl SqlBody {
    /// Whether there is nothing to execute.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// A migration defined by a SQL file, validated at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlMigration {
    /// Up body.
    pub up: SqlBody,
    /// Down body. Empty bodies only remove the ledger row.
    pub down: SqlBody,
}

impl SqlMigration {
    /// Parse and split a migration file.
    pub fn parse(
        source: &str,
        markers: &Markers,
        default_transactional: bool,
    ) -> Result<Self, ParseError> {
        let parsed = parser::parse(source, markers, default_transactional)?;
        Ok(Self {
            up: SqlBody {
                statements: parser::split_statements(&parsed.up, markers)?,
                transactional: parsed.tx_up,
            },
            down: SqlBody {
                statements: parser::split_statements(&parsed.down, markers)?,
                transactional: parsed.tx_down,
            },
        })
    }

    /// Body for a direction.
    pub fn body(&self, direction: Direction) -> &SqlBody {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}

/// What a migration does.
#[derive(Clone)]
pub enum MigrationBody {
    /// Statements from a SQL file.
    Sql(SqlMigration),
    /// Separate functions per direction, run literally.
    Functions {
        /// Applies the migration.
        up: Arc<dyn MigrationFn>,
        /// Reverts the migration.
        down: Arc<dyn MigrationFn>,
    },
    /// One function; structural operations invert themselves when reverting.
    Change(Arc<dyn MigrationFn>),
}

impl fmt::Debug for MigrationBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(sql) => f.debug_tuple("Sql").field(sql).finish(),
            Self::Functions { .. } => f.write_str("Functions"),
            Self::Change(_) => f.write_str("Change"),
        }
    }
}

/// What the engine runs for one direction of a migration.
pub(crate) enum Step<'m> {
    Sql(&'m SqlBody),
    Call(&'m dyn MigrationFn, Mode),
}

/// A migration descriptor.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version, sortable by creation time.
    pub version: i64,
    /// Human-readable name.
    pub name: String,
    /// The migration logic.
    pub body: MigrationBody,
}

impl Migration {
    /// Create a migration from a body.
    pub fn new(version: i64, name: impl Into<String>, body: MigrationBody) -> Self {
        Self {
            version,
            name: name.into(),
            body,
        }
    }

    /// Create a migration from SQL source with both markers.
    pub fn sql(
        version: i64,
        name: impl Into<String>,
        source: &str,
        markers: &Markers,
        default_transactional: bool,
    ) -> MigrateResult<Self> {
        let sql = SqlMigration::parse(source, markers, default_transactional)?;
        Ok(Self::new(version, name, MigrationBody::Sql(sql)))
    }

    /// Create a migration from separate up and down functions.
    pub fn functions<U, D>(version: i64, name: impl Into<String>, up: U, down: D) -> Self
    where
        U: for<'s, 'c> Fn(&'s mut MigrationContext<'c>) -> BoxFuture<'s, MigrateResult<()>>
            + Send
            + Sync
            + 'static,
        D: for<'s, 'c> Fn(&'s mut MigrationContext<'c>) -> BoxFuture<'s, MigrateResult<()>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(
            version,
            name,
            MigrationBody::Functions {
                up: Arc::new(up),
                down: Arc::new(down),
            },
        )
    }

    /// Create a migration from a single reversible function.
    pub fn change<F>(version: i64, name: impl Into<String>, change: F) -> Self
    where
        F: for<'s, 'c> Fn(&'s mut MigrationContext<'c>) -> BoxFuture<'s, MigrateResult<()>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(version, name, MigrationBody::Change(Arc::new(change)))
    }

    /// Load a `<version>_<name>.sql` file.
    pub async fn from_file(
        path: impl AsRef<Path>,
        markers: &Markers,
        default_transactional: bool,
    ) -> MigrateResult<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrationError::migration_file(format!("Invalid path: {}", path.display())))?;
        let (version, name) = parse_file_name(file_name).ok_or_else(|| {
            MigrationError::migration_file(format!(
                "Invalid migration file name '{}', expected <version>_<name>.sql",
                file_name
            ))
        })?;

        let source = tokio::fs::read_to_string(path).await?;
        let sql = SqlMigration::parse(&source, markers, default_transactional).map_err(|source| {
            MigrationError::ParseFile {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Ok(Self::new(version, name, MigrationBody::Sql(sql)))
    }

    /// `<version>_<name>`, as used in file names and logs.
    pub fn full_name(&self) -> String {
        format!("{}_{}", self.version, self.name)
    }

    /// Whether this migration is loaded from SQL.
    pub fn is_sql(&self) -> bool {
        matches!(self.body, MigrationBody::Sql(_))
    }

    pub(crate) fn step(&self, direction: Direction) -> Step<'_> {
        match &self.body {
            MigrationBody::Sql(sql) => Step::Sql(sql.body(direction)),
            MigrationBody::Functions { up, down } => {
                let f = match direction {
                    Direction::Up => up,
                    Direction::Down => down,
                };
                Step::Call(f.as_ref(), Mode::NotReversible)
            }
            MigrationBody::Change(f) => Step::Call(f.as_ref(), Mode::from(direction)),
        }
    }
}

/// Split `<version>_<name>.sql` into its parts.
pub fn parse_file_name(file_name: &str) -> Option<(i64, String)> {
    let stem = file_name.strip_suffix(".sql")?;
    let (version, name) = stem.split_once('_')?;
    if version.is_empty() || !version.chars().all(|c| c.is_ascii_digit()) || name.is_empty() {
        return None;
    }
    let version = version.parse::<i64>().ok()?;
    Some((version, name.to_string()))
}

/// The ordered collection of known migrations.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// Build a set, sorting by version.
    ///
    /// Versions must be positive and unique.
    pub fn new(migrations: impl IntoIterator<Item = Migration>) -> MigrateResult<Self> {
        let mut migrations: Vec<Migration> = migrations.into_iter().collect();
        migrations.sort_by_key(|m| m.version);

        if let Some(m) = migrations.iter().find(|m| m.version <= 0) {
            return Err(MigrationError::migration_file(format!(
                "Migration '{}' has non-positive version {}",
                m.name, m.version
            )));
        }
        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(MigrationError::DuplicateVersion(pair[0].version));
        }

        Ok(Self { migrations })
    }

    /// Migrations in ascending version order.
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Look up a migration by version.
    pub fn get(&self, version: i64) -> Option<&Migration> {
        self.migrations
            .binary_search_by_key(&version, |m| m.version)
            .ok()
            .map(|idx| &self.migrations[idx])
    }

    /// Iterate in ascending version order.
    pub fn iter(&self) -> std::slice::Iter<'_, Migration> {
        self.migrations.iter()
    }

    /// Number of migrations.
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl<'a> IntoIterator for &'a MigrationSet {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Whether a migration is applied.
#[derive(Debug, Clone)]
pub struct MigrationStatus<'a> {
    /// The migration.
    pub migration: &'a Migration,
    /// Whether it is in the ledger.
    pub applied: bool,
    /// When it was applied.
    pub applied_at: Option<DateTime<Utc>>,
}
