//! CLI command implementations.

pub mod down;
pub mod generate;
pub mod show_config;
pub mod status;
pub mod up;

use std::time::Duration;

use tidemark_migrate::{
    CancellationToken, Database, Direction, ExecutionOptions, LedgerDriver, MigrationEngine,
    MigrationFileManager, MigrationSet,
};
use tidemark_postgres::PgDatabase;
use tidemark_sqlite::SqliteDatabase;
use tracing::debug;

use crate::cli::RunArgs;
use crate::config::Config;
use crate::error::{CliError, CliResult};
use crate::output;

/// A connected migration target.
pub enum Backend {
    /// SQLite file or in-memory database
    Sqlite(SqliteDatabase),
    /// PostgreSQL server
    Postgres(PgDatabase),
}

/// The driver a URL selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// `sqlite:`, `file:`, `:memory:` or a bare path
    Sqlite,
    /// `postgres://` or `postgresql://`
    Postgres,
}

impl BackendKind {
    /// Pick a driver from the URL scheme.
    pub fn from_url(url: &str) -> CliResult<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if url.starts_with("sqlite:") || url.starts_with("file:") || !url.contains("://") {
            Ok(Self::Sqlite)
        } else {
            let scheme = url.split("://").next().unwrap_or_default();
            Err(CliError::Config(format!(
                "unsupported database URL scheme '{}'; expected sqlite or postgres",
                scheme
            )))
        }
    }
}

impl Backend {
    /// Connect to the database named by the configuration.
    pub async fn connect(config: &Config) -> CliResult<Self> {
        let url = config.database_url()?;
        debug!(kind = ?BackendKind::from_url(url)?, "connecting");
        Ok(match BackendKind::from_url(url)? {
            BackendKind::Sqlite => Self::Sqlite(SqliteDatabase::connect(url).await?),
            BackendKind::Postgres => Self::Postgres(PgDatabase::connect_url(url).await?),
        })
    }
}

/// Build an engine for whichever backend is connected and evaluate `$body`
/// with it bound to `$engine`.
macro_rules! with_engine {
    ($backend:expr, $config:expr, $migrations:expr, |$engine:ident| $body:expr) => {
        match $backend {
            $crate::commands::Backend::Sqlite(db) => {
                let ledger = db.ledger($config.migrations.table_name.clone());
                let $engine = tidemark_migrate::MigrationEngine::new(db, ledger, $migrations);
                $body
            }
            $crate::commands::Backend::Postgres(db) => {
                let ledger = db.ledger($config.migrations.table_name.clone());
                let $engine = tidemark_migrate::MigrationEngine::new(db, ledger, $migrations);
                $body
            }
        }
    };
}
pub(crate) use with_engine;

/// Load the migration files named by the configuration.
pub async fn load_migrations(config: &Config) -> CliResult<MigrationSet> {
    let manager = MigrationFileManager::from_config(&config.migrations);
    Ok(manager.load().await?)
}

/// Translate run flags into engine options.
pub fn execution_options(args: &RunArgs, token: CancellationToken) -> ExecutionOptions {
    let mut options = ExecutionOptions::new()
        .dry_run(args.dry_run)
        .continue_on_error(args.continue_on_error)
        .cancellation(token);

    if let Some(steps) = args.steps {
        options = options.steps(steps);
    }
    if let Some(target) = args.target {
        options = options.target(target);
    }
    if let Some(secs) = args.timeout {
        options = options.timeout(Duration::from_secs(secs));
    }

    options
}

/// Execute a run, printing each result as it completes.
///
/// Fails with [`CliError::Failed`] when any migration failed.
pub async fn execute<D: Database, L: LedgerDriver>(
    engine: &MigrationEngine<D, L>,
    direction: Direction,
    options: ExecutionOptions,
) -> CliResult<()> {
    let dry_run = options.dry_run;
    let mut run = engine.run(direction, options).await?;

    if run.pending() == 0 {
        match direction {
            Direction::Up => output::success("Database is up to date."),
            Direction::Down => output::success("Nothing to revert."),
        }
        return Ok(());
    }

    let mut succeeded = 0;
    let mut failed = 0;
    while let Some(result) = run.next().await {
        output::migration_result(&result);
        if result.is_success() {
            succeeded += 1;
        } else {
            failed += 1;
        }
    }

    output::newline();
    if failed > 0 {
        return Err(CliError::Failed(failed));
    }

    let verb = match direction {
        Direction::Up => "Applied",
        Direction::Down => "Reverted",
    };
    if dry_run {
        output::success(&format!("{} {} migration(s) (dry run, rolled back)", verb, succeeded));
    } else {
        output::success(&format!("{} {} migration(s)", verb, succeeded));
    }
    Ok(())
}

/// A token cancelled when the user presses Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            output::warn("Interrupted, stopping the current migration");
            child.cancel();
        }
    });

    token
}
