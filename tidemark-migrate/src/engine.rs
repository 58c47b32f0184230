//! Migration engine implementation.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use futures::{FutureExt, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::MigrationContext;
use crate::database::{Database, Executor};
use crate::direction::{Direction, Mode};
use crate::error::{MigrateResult, MigrationError};
use crate::ledger::{DEFAULT_TABLE_NAME, LedgerDriver, MigrationRecord};
use crate::migration::{Migration, MigrationSet, MigrationStatus, SqlBody, Step};
use crate::parser::Markers;
use crate::resolver;
use crate::sql::Dialect;

/// Configuration for the migration engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Directory containing migration files.
    pub directory: PathBuf,
    /// Name of the ledger table.
    pub table_name: String,
    /// Whether SQL bodies run in a transaction unless marked otherwise.
    pub transactional: bool,
    /// Marker lines in SQL files.
    pub markers: Markers,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./migrations"),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            transactional: true,
            markers: Markers::default(),
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = dir.into();
        self
    }

    /// Set the ledger table name.
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Set the default transaction mode of SQL bodies.
    pub fn transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    /// Set the SQL file markers.
    pub fn markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }
}

/// Options for a single run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Run exactly this version.
    pub target: Option<i64>,
    /// Limit the number of migrations.
    pub steps: Option<i32>,
    /// Roll back every migration instead of committing it.
    pub dry_run: bool,
    /// Log and skip failing statements inside a migration.
    pub continue_on_error: bool,
    /// Deadline for the whole run.
    pub timeout: Option<Duration>,
    /// Cancels the run when triggered.
    pub cancellation: Option<CancellationToken>,
}

impl ExecutionOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run exactly this version.
    pub fn target(mut self, version: i64) -> Self {
        self.target = Some(version);
        self
    }

    /// Limit the number of migrations.
    pub fn steps(mut self, steps: i32) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Enable dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the continue-on-error policy.
    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    /// Set the run deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Outcome of one attempted migration.
#[derive(Debug)]
pub struct ExecutionResult<'m> {
    /// The migration.
    pub migration: &'m Migration,
    /// Direction it ran in.
    pub direction: Direction,
    /// The error, if it failed.
    pub error: Option<MigrationError>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Whether the effects were discarded.
    pub dry_run: bool,
}

impl ExecutionResult<'_> {
    /// Check whether the migration succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Cancellation and deadline shared by every database call of a run.
#[derive(Debug, Clone)]
struct RunContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    timeout: Duration,
}

impl RunContext {
    fn new(options: &ExecutionOptions) -> Self {
        let timeout = options.timeout.unwrap_or(Duration::ZERO);
        Self {
            token: options.cancellation.clone().unwrap_or_default(),
            deadline: options.timeout.map(|t| Instant::now() + t),
            timeout,
        }
    }

    fn check(&self) -> MigrateResult<()> {
        if self.token.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(MigrationError::Timeout(self.timeout));
        }
        Ok(())
    }

    /// Run `fut`, aborting it on cancellation or when the deadline passes.
    ///
    /// On abort the database is interrupted before returning, so a statement
    /// still running on the server does not hold up the rollback.
    async fn guard<T, F>(&self, db: &dyn Database, fut: F) -> MigrateResult<T>
    where
        F: Future<Output = MigrateResult<T>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        let err = tokio::select! {
            biased;
            _ = self.token.cancelled() => MigrationError::Cancelled,
            _ = deadline => MigrationError::Timeout(self.timeout),
            result = fut => return result,
        };

        warn!(error = %err, "interrupting running statement");
        db.interrupt().await;
        Err(err)
    }
}

/// Applies and reverts migrations against one database.
pub struct MigrationEngine<D, L> {
    db: D,
    ledger: L,
    migrations: MigrationSet,
    ledger_ready: OnceCell<()>,
}

impl<D: Database, L: LedgerDriver> MigrationEngine<D, L> {
    /// Create a new migration engine.
    pub fn new(db: D, ledger: L, migrations: MigrationSet) -> Self {
        Self {
            db,
            ledger,
            migrations,
            ledger_ready: OnceCell::new(),
        }
    }

    /// The known migrations.
    pub fn migrations(&self) -> &MigrationSet {
        &self.migrations
    }

    /// The target database.
    pub fn database(&self) -> &D {
        &self.db
    }

    /// The ledger driver.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Create the ledger table, once per engine.
    async fn ensure_ledger(&self) -> MigrateResult<()> {
        self.ledger_ready
            .get_or_try_init(|| async {
                debug!(table = self.ledger.table_name(), "ensuring ledger table");
                self.ledger.create_if_missing().await
            })
            .await?;
        Ok(())
    }

    /// Resolve the migrations a run would execute.
    pub async fn plan(
        &self,
        direction: Direction,
        options: &ExecutionOptions,
    ) -> MigrateResult<Vec<&Migration>> {
        let state = self.ledger.applied().await?;
        if state.is_first_run() {
            debug!("ledger table not found, treating as first run");
        }
        resolver::resolve(
            direction,
            self.migrations.migrations(),
            &state,
            options.target,
            options.steps,
        )
    }

    /// Status of every known migration.
    ///
    /// Ledger rows without a matching migration are logged.
    pub async fn status(&self) -> MigrateResult<Vec<MigrationStatus<'_>>> {
        let state = self.ledger.applied().await?;
        resolver::orphaned(self.migrations.migrations(), &state);
        Ok(resolver::status(self.migrations.migrations(), &state))
    }

    /// Ledger rows without a matching migration.
    pub async fn orphaned(&self) -> MigrateResult<Vec<MigrationRecord>> {
        let state = self.ledger.applied().await?;
        Ok(resolver::orphaned(self.migrations.migrations(), &state)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Start a run.
    ///
    /// Resolution errors are returned here, before anything is executed.
    /// Migrations then run one at a time as the returned [`MigrationRun`] is
    /// polled.
    pub async fn run(
        &self,
        direction: Direction,
        options: ExecutionOptions,
    ) -> MigrateResult<MigrationRun<'_, D, L>> {
        let work = self.plan(direction, &options).await?;
        info!(
            direction = %direction,
            count = work.len(),
            dry_run = options.dry_run,
            "starting migration run"
        );

        let remaining = match options.steps {
            Some(n) if n > 0 => Some(n as usize),
            _ => None,
        };

        Ok(MigrationRun {
            engine: self,
            direction,
            work: work.into_iter(),
            rcx: RunContext::new(&options),
            options,
            remaining,
            halted: false,
        })
    }

    /// Apply pending migrations and collect the results.
    pub async fn up(&self, options: ExecutionOptions) -> MigrateResult<Vec<ExecutionResult<'_>>> {
        Ok(self.run(Direction::Up, options).await?.collect().await)
    }

    /// Revert applied migrations and collect the results.
    pub async fn down(&self, options: ExecutionOptions) -> MigrateResult<Vec<ExecutionResult<'_>>> {
        Ok(self.run(Direction::Down, options).await?.collect().await)
    }
}

/// A lazy, in-progress run.
///
/// Each call to [`next`](Self::next) executes one migration. Dropping the run
/// stops it; migrations already committed stay committed.
pub struct MigrationRun<'e, D, L> {
    engine: &'e MigrationEngine<D, L>,
    direction: Direction,
    work: std::vec::IntoIter<&'e Migration>,
    options: ExecutionOptions,
    rcx: RunContext,
    remaining: Option<usize>,
    halted: bool,
}

impl<'e, D: Database, L: LedgerDriver> MigrationRun<'e, D, L> {
    /// Direction of this run.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Migrations not yet attempted.
    pub fn pending(&self) -> usize {
        if self.halted { 0 } else { self.work.len() }
    }

    /// Execute the next migration.
    ///
    /// Returns `None` once the work list is exhausted or after a failure.
    pub async fn next(&mut self) -> Option<ExecutionResult<'e>> {
        if self.halted || self.remaining == Some(0) {
            return None;
        }
        let migration = self.work.next()?;

        let started = std::time::Instant::now();
        let mut warnings = Vec::new();
        let outcome = self.execute(migration, &mut warnings).await;
        let duration = started.elapsed();

        let error = match outcome {
            Ok(()) => {
                info!(
                    version = migration.version,
                    name = %migration.name,
                    direction = %self.direction,
                    duration_ms = duration.as_millis() as u64,
                    dry_run = self.options.dry_run,
                    "migration finished"
                );
                None
            }
            Err(err) => {
                error!(
                    version = migration.version,
                    name = %migration.name,
                    direction = %self.direction,
                    error = %err,
                    "migration failed, rolled back"
                );
                self.halted = true;
                Some(err)
            }
        };

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }

        Some(ExecutionResult {
            migration,
            direction: self.direction,
            error,
            warnings,
            duration,
            dry_run: self.options.dry_run,
        })
    }

    /// Turn the run into a stream of results.
    pub fn into_stream(self) -> impl Stream<Item = ExecutionResult<'e>> + 'e {
        futures::stream::unfold(self, |mut run| async move {
            let result = run.next().await?;
            Some((result, run))
        })
    }

    /// Drive the run to completion.
    pub async fn collect(mut self) -> Vec<ExecutionResult<'e>> {
        let mut results = Vec::new();
        while let Some(result) = self.next().await {
            results.push(result);
        }
        results
    }

    async fn execute(&self, migration: &Migration, warnings: &mut Vec<String>) -> MigrateResult<()> {
        self.rcx.check()?;
        self.rcx.guard(&self.engine.db, self.engine.ensure_ledger()).await?;

        match migration.step(self.direction) {
            Step::Sql(body) if !body.transactional => {
                self.execute_autocommit(migration, body, warnings).await
            }
            step => self.execute_transactional(migration, step, warnings).await,
        }
    }

    async fn execute_transactional(
        &self,
        migration: &Migration,
        step: Step<'_>,
        warnings: &mut Vec<String>,
    ) -> MigrateResult<()> {
        let engine = self.engine;
        let dry_run = self.options.dry_run;

        if !engine.db.dialect().supports_transactional_ddl() {
            warn!(
                version = migration.version,
                "database does not roll back DDL, a failed migration may leave partial changes"
            );
            warnings.push("DDL is not transactional on this database".to_string());
        }

        let mut tx = self.rcx.guard(&engine.db, engine.db.begin()).await?;
        let body = apply(
            migration,
            self.direction,
            step,
            tx.as_executor(),
            engine.db.dialect(),
            &engine.ledger,
            self.options.continue_on_error,
            warnings,
        );
        let result = self.rcx.guard(&engine.db, body).await;

        let result = match result {
            Err(err) if dry_run && !err.is_force_stop() => {
                warnings.push(format!("dry run: {}", err));
                Ok(())
            }
            other => other,
        };

        match result {
            Ok(()) if dry_run => {
                debug!(version = migration.version, "dry run, rolling back");
                tx.rollback().await
            }
            Ok(()) => tx.commit().await,
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(version = migration.version, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn execute_autocommit(
        &self,
        migration: &Migration,
        body: &SqlBody,
        warnings: &mut Vec<String>,
    ) -> MigrateResult<()> {
        if self.options.dry_run {
            warnings.push("dry run: non-transactional body was not executed".to_string());
            return Ok(());
        }

        let engine = self.engine;
        let mut executor = self.rcx.guard(&engine.db, engine.db.autocommit()).await?;
        let run = apply(
            migration,
            self.direction,
            Step::Sql(body),
            executor.as_mut(),
            engine.db.dialect(),
            &engine.ledger,
            self.options.continue_on_error,
            warnings,
        );
        let result = self.rcx.guard(&engine.db, run).await;

        if result.is_err() {
            warn!(
                version = migration.version,
                "non-transactional migration failed, earlier statements stay applied"
            );
        }
        result
    }
}

/// Run a migration body and update the ledger on the same executor.
#[allow(clippy::too_many_arguments)]
async fn apply(
    migration: &Migration,
    direction: Direction,
    step: Step<'_>,
    executor: &mut dyn Executor,
    dialect: &dyn Dialect,
    ledger: &dyn LedgerDriver,
    continue_on_error: bool,
    warnings: &mut Vec<String>,
) -> MigrateResult<()> {
    let body = async {
        match step {
            Step::Sql(body) => {
                let mut ctx = MigrationContext::new(
                    &mut *executor,
                    dialect,
                    Mode::NotReversible,
                    continue_on_error,
                    &mut *warnings,
                );
                for statement in &body.statements {
                    ctx.execute(statement).await?;
                }
                Ok(())
            }
            Step::Call(f, mode) => {
                let mut ctx =
                    MigrationContext::new(&mut *executor, dialect, mode, continue_on_error, &mut *warnings);
                f.call(&mut ctx).await
            }
        }
    };

    AssertUnwindSafe(body)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(MigrationError::Panicked(panic_message(payload.as_ref()))))?;

    match direction {
        Direction::Up => {
            let record = MigrationRecord::new(migration.version, migration.name.clone());
            ledger.insert(executor, &[record]).await
        }
        Direction::Down => ledger.delete(executor, &[migration.version]).await,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures::StreamExt;

    use super::*;
    use crate::database::Transaction;
    use crate::ledger::LedgerState;
    use crate::schema::{Column, ColumnType, Table};
    use crate::sql::{ClickHouseDialect, SqliteDialect};

    #[derive(Default)]
    struct State {
        ledger_created: usize,
        applied: BTreeMap<i64, String>,
        schema: Vec<String>,
        begins: usize,
        commits: usize,
        rollbacks: usize,
        interrupts: usize,
    }

    impl State {
        fn apply(&mut self, statements: Vec<String>) {
            for sql in statements {
                if let Some(rest) = sql.strip_prefix("LEDGER INSERT ") {
                    let (version, name) = rest.split_once(' ').unwrap();
                    self.applied.insert(version.parse().unwrap(), name.to_string());
                } else if let Some(version) = sql.strip_prefix("LEDGER DELETE ") {
                    self.applied.remove(&version.parse().unwrap());
                } else {
                    self.schema.push(sql);
                }
            }
        }
    }

    type Shared = Arc<Mutex<State>>;

    async fn run_statement(sql: &str) -> MigrateResult<()> {
        if sql.contains("FAIL") {
            return Err(MigrationError::database(format!("cannot run {}", sql)));
        }
        if sql.contains("PANIC") {
            panic!("statement panicked");
        }
        if sql.contains("SLOW") {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(())
    }

    struct MockTx {
        state: Shared,
        pending: Vec<String>,
    }

    #[async_trait]
    impl Executor for MockTx {
        async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
            run_statement(sql).await?;
            self.pending.push(sql.to_string());
            Ok(())
        }
    }

    #[async_trait]
    impl Transaction for MockTx {
        async fn commit(self: Box<Self>) -> MigrateResult<()> {
            let MockTx { state, pending } = *self;
            let mut state = state.lock().unwrap();
            state.commits += 1;
            state.apply(pending);
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> MigrateResult<()> {
            self.state.lock().unwrap().rollbacks += 1;
            Ok(())
        }

        fn as_executor(&mut self) -> &mut dyn Executor {
            self
        }
    }

    struct MockAutocommit {
        state: Shared,
    }

    #[async_trait]
    impl Executor for MockAutocommit {
        async fn execute(&mut self, sql: &str) -> MigrateResult<()> {
            run_statement(sql).await?;
            self.state.lock().unwrap().apply(vec![sql.to_string()]);
            Ok(())
        }
    }

    struct MockDb {
        state: Shared,
        dialect: &'static dyn Dialect,
    }

    #[async_trait]
    impl Database for MockDb {
        fn dialect(&self) -> &dyn Dialect {
            self.dialect
        }

        async fn interrupt(&self) {
            self.state.lock().unwrap().interrupts += 1;
        }

        async fn begin(&self) -> MigrateResult<Box<dyn Transaction>> {
            self.state.lock().unwrap().begins += 1;
            Ok(Box::new(MockTx {
                state: self.state.clone(),
                pending: Vec::new(),
            }))
        }

        async fn autocommit(&self) -> MigrateResult<Box<dyn Executor>> {
            Ok(Box::new(MockAutocommit {
                state: self.state.clone(),
            }))
        }
    }

    struct MockLedger {
        state: Shared,
    }

    #[async_trait]
    impl LedgerDriver for MockLedger {
        fn table_name(&self) -> &str {
            DEFAULT_TABLE_NAME
        }

        async fn create_if_missing(&self) -> MigrateResult<()> {
            self.state.lock().unwrap().ledger_created += 1;
            Ok(())
        }

        async fn applied(&self) -> MigrateResult<LedgerState> {
            let state = self.state.lock().unwrap();
            if state.ledger_created == 0 {
                return Ok(LedgerState::FirstRun);
            }
            Ok(LedgerState::from_records(
                state
                    .applied
                    .iter()
                    .map(|(v, name)| MigrationRecord::new(*v, name.clone()))
                    .collect(),
            ))
        }

        async fn insert(
            &self,
            executor: &mut dyn Executor,
            records: &[MigrationRecord],
        ) -> MigrateResult<()> {
            for r in records {
                executor
                    .execute(&format!("LEDGER INSERT {} {}", r.version, r.name))
                    .await?;
            }
            Ok(())
        }

        async fn delete(&self, executor: &mut dyn Executor, versions: &[i64]) -> MigrateResult<()> {
            for v in versions {
                executor.execute(&format!("LEDGER DELETE {}", v)).await?;
            }
            Ok(())
        }
    }

    fn sql(version: i64, up: &str, down: &str) -> Migration {
        Migration::sql(
            version,
            format!("m{}", version),
            &format!("-- migrate:up\n{}\n-- migrate:down\n{}\n", up, down),
            &Markers::default(),
            true,
        )
        .unwrap()
    }

    fn engine(migrations: Vec<Migration>) -> (MigrationEngine<MockDb, MockLedger>, Shared) {
        let state = Shared::default();
        let engine = MigrationEngine::new(
            MockDb {
                state: state.clone(),
                dialect: &SqliteDialect,
            },
            MockLedger {
                state: state.clone(),
            },
            MigrationSet::new(migrations).unwrap(),
        );
        (engine, state)
    }

    fn three() -> Vec<Migration> {
        vec![
            sql(1, "CREATE A;", "DROP A;"),
            sql(2, "CREATE B;", "DROP B;"),
            sql(3, "CREATE C;", "DROP C;"),
        ]
    }

    fn applied(state: &Shared) -> Vec<i64> {
        state.lock().unwrap().applied.keys().copied().collect()
    }

    #[tokio::test]
    async fn test_up_applies_in_order() {
        let (engine, state) = engine(three());

        let results = engine.up(ExecutionOptions::new()).await.unwrap();
        let versions: Vec<i64> = results.iter().map(|r| r.migration.version).collect();

        assert_eq!(versions, vec![1, 2, 3]);
        assert!(results.iter().all(|r| r.is_success()));
        assert_eq!(applied(&state), vec![1, 2, 3]);
        assert_eq!(state.lock().unwrap().schema, vec!["CREATE A", "CREATE B", "CREATE C"]);
    }

    #[tokio::test]
    async fn test_fail_fast() {
        let (engine, state) = engine(vec![
            sql(1, "CREATE A;", "DROP A;"),
            sql(2, "FAIL B;", "DROP B;"),
            sql(3, "CREATE C;", "DROP C;"),
        ]);

        let results = engine.up(ExecutionOptions::new()).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert!(matches!(results[1].error, Some(MigrationError::Database(_))));
        assert_eq!(applied(&state), vec![1]);
        assert_eq!(state.lock().unwrap().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_nothing() {
        let (engine, state) = engine(three());

        let results = engine.up(ExecutionOptions::new().dry_run(true)).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_success() && r.dry_run));
        let state = state.lock().unwrap();
        assert!(state.applied.is_empty());
        assert!(state.schema.is_empty());
        assert_eq!(state.commits, 0);
        assert_eq!(state.rollbacks, 3);
    }

    #[tokio::test]
    async fn test_dry_run_downgrades_errors() {
        let (engine, _state) = engine(vec![sql(1, "FAIL A;", "DROP A;")]);

        let results = engine.up(ExecutionOptions::new().dry_run(true)).await.unwrap();

        assert!(results[0].is_success());
        assert!(results[0].warnings[0].starts_with("dry run:"));
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (engine, state) = engine(three());

        engine.up(ExecutionOptions::new()).await.unwrap();
        let results = engine.down(ExecutionOptions::new().steps(0)).await.unwrap();
        let versions: Vec<i64> = results.iter().map(|r| r.migration.version).collect();
        assert_eq!(versions, vec![3, 2, 1]);
        assert!(applied(&state).is_empty());

        engine.up(ExecutionOptions::new()).await.unwrap();
        assert_eq!(applied(&state), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_down_defaults_to_one() {
        let (engine, state) = engine(three());

        engine.up(ExecutionOptions::new()).await.unwrap();
        let results = engine.down(ExecutionOptions::new()).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(applied(&state), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_resolution_errors_touch_nothing() {
        let (engine, state) = engine(three());
        engine.up(ExecutionOptions::new().steps(1)).await.unwrap();
        let begins = state.lock().unwrap().begins;

        let err = engine
            .run(Direction::Up, ExecutionOptions::new().target(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MigrationError::AlreadyApplied(1)));

        let err = engine
            .run(Direction::Down, ExecutionOptions::new().target(3))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MigrationError::NotApplied(3)));

        assert_eq!(state.lock().unwrap().begins, begins);
    }

    #[tokio::test]
    async fn test_steps_stop_the_run() {
        let (engine, state) = engine(three());

        let results = engine.up(ExecutionOptions::new().steps(2)).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(applied(&state), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_ledger_created_once() {
        let (engine, state) = engine(three());

        engine.up(ExecutionOptions::new()).await.unwrap();
        engine.down(ExecutionOptions::new()).await.unwrap();

        assert_eq!(state.lock().unwrap().ledger_created, 1);
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let (engine, state) = engine(vec![sql(1, "PANIC;", "")]);

        let results = engine.up(ExecutionOptions::new()).await.unwrap();

        assert!(matches!(results[0].error, Some(MigrationError::Panicked(_))));
        assert!(applied(&state).is_empty());
        assert_eq!(state.lock().unwrap().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_timeout_rolls_back() {
        let (engine, state) = engine(vec![sql(1, "SLOW;", ""), sql(2, "CREATE B;", "")]);

        let results = engine
            .up(ExecutionOptions::new().timeout(Duration::from_millis(50)))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].error, Some(MigrationError::Timeout(_))));
        assert!(applied(&state).is_empty());
        let state = state.lock().unwrap();
        assert_eq!(state.interrupts, 1);
        assert_eq!(state.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_statement() {
        let (engine, state) = engine(vec![sql(1, "SLOW;", ""), sql(2, "CREATE B;", "")]);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let results = engine.up(ExecutionOptions::new().cancellation(token)).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].error, Some(MigrationError::Cancelled)));
        let state = state.lock().unwrap();
        assert_eq!(state.interrupts, 1);
        assert_eq!(state.rollbacks, 1);
        assert!(state.applied.is_empty());
    }

    #[tokio::test]
    async fn test_completed_run_never_interrupts() {
        let (engine, state) = engine(three());

        engine
            .up(ExecutionOptions::new().timeout(Duration::from_secs(30)))
            .await
            .unwrap();

        assert_eq!(state.lock().unwrap().interrupts, 0);
    }

    #[tokio::test]
    async fn test_non_transactional_ddl_is_flagged() {
        let state = Shared::default();
        let clickhouse = MigrationEngine::new(
            MockDb {
                state: state.clone(),
                dialect: &ClickHouseDialect,
            },
            MockLedger {
                state: state.clone(),
            },
            MigrationSet::new(vec![sql(1, "CREATE A;", "DROP A;")]).unwrap(),
        );

        let results = clickhouse.up(ExecutionOptions::new()).await.unwrap();
        assert!(results[0].is_success());
        assert_eq!(results[0].warnings, vec!["DDL is not transactional on this database"]);

        let (sqlite, _state) = engine(vec![sql(1, "CREATE A;", "DROP A;")]);
        let results = sqlite.up(ExecutionOptions::new()).await.unwrap();
        assert!(results[0].warnings.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (engine, state) = engine(three());
        let token = CancellationToken::new();
        token.cancel();

        let results = engine.up(ExecutionOptions::new().cancellation(token)).await.unwrap();

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].error, Some(MigrationError::Cancelled)));
        assert_eq!(state.lock().unwrap().begins, 0);
    }

    #[tokio::test]
    async fn test_change_migration_inverts() {
        let change = Migration::change(1, "create_users", |ctx| {
            Box::pin(async move {
                let users = Table::new("users")
                    .column(Column::new("id", ColumnType::Integer).primary_key());
                ctx.create_table(&users).await
            })
        });
        let (engine, state) = engine(vec![change]);

        engine.up(ExecutionOptions::new()).await.unwrap();
        engine.down(ExecutionOptions::new()).await.unwrap();

        let state = state.lock().unwrap();
        assert!(state.schema[0].starts_with("CREATE TABLE \"users\""));
        assert_eq!(state.schema[1], "DROP TABLE \"users\"");
        assert!(state.applied.is_empty());
    }

    #[tokio::test]
    async fn test_functions_run_literally() {
        let migration = Migration::functions(
            1,
            "funcs",
            |ctx| Box::pin(async move { ctx.execute("UP").await }),
            |ctx| Box::pin(async move { ctx.execute("DOWN").await }),
        );
        let (engine, state) = engine(vec![migration]);

        engine.up(ExecutionOptions::new()).await.unwrap();
        let results = engine.down(ExecutionOptions::new()).await.unwrap();

        assert!(results[0].warnings.is_empty());
        assert_eq!(state.lock().unwrap().schema, vec!["UP", "DOWN"]);
    }

    #[tokio::test]
    async fn test_non_transactional_body() {
        let migration = Migration::sql(
            1,
            "concurrent_index",
            "-- migrate:up tx=false\nCREATE INDEX CONCURRENTLY i;\n",
            &Markers::default(),
            true,
        )
        .unwrap();
        let (engine, state) = engine(vec![migration]);

        let results = engine.up(ExecutionOptions::new().dry_run(true)).await.unwrap();
        assert!(results[0].is_success());
        assert!(state.lock().unwrap().schema.is_empty());

        engine.up(ExecutionOptions::new()).await.unwrap();
        let state = state.lock().unwrap();
        assert_eq!(state.begins, 0);
        assert_eq!(state.schema, vec!["CREATE INDEX CONCURRENTLY i"]);
        assert_eq!(state.applied.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_continue_on_error_inside_migration() {
        let (engine, state) = engine(vec![sql(1, "FAIL X; CREATE A;", "")]);

        let results = engine
            .up(ExecutionOptions::new().continue_on_error(true))
            .await
            .unwrap();

        assert!(results[0].is_success());
        assert_eq!(results[0].warnings.len(), 1);
        assert_eq!(applied(&state), vec![1]);
        assert_eq!(state.lock().unwrap().schema, vec!["CREATE A"]);
    }

    #[tokio::test]
    async fn test_force_stop_halts_despite_policy() {
        let migration = Migration::functions(
            1,
            "halt",
            |_ctx| Box::pin(async { Err(MigrationError::force_stop("data is corrupt")) }),
            |_ctx| Box::pin(async { Ok(()) }),
        );
        let (engine, state) = engine(vec![migration, sql(2, "CREATE B;", "")]);

        let results = engine
            .up(ExecutionOptions::new().continue_on_error(true).dry_run(true))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].error, Some(MigrationError::ForceStop(_))));
        assert!(applied(&state).is_empty());
    }

    #[tokio::test]
    async fn test_stream_stops_early() {
        let (engine, state) = engine(three());

        let run = engine.run(Direction::Up, ExecutionOptions::new()).await.unwrap();
        let first: Vec<_> = run.into_stream().take(1).collect().await;

        assert_eq!(first.len(), 1);
        assert_eq!(applied(&state), vec![1]);
    }

    #[tokio::test]
    async fn test_status() {
        let (engine, _state) = engine(three());
        engine.up(ExecutionOptions::new().steps(1)).await.unwrap();

        let statuses = engine.status().await.unwrap();
        let applied: Vec<bool> = statuses.iter().map(|s| s.applied).collect();
        assert_eq!(applied, vec![true, false, false]);
    }
}
