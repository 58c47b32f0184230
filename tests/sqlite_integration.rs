//! End-to-end migration runs against SQLite.

use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tidemark::migrate::{
    CancellationToken, Column, ColumnType, Direction, ExecutionOptions, Index, LedgerDriver,
    Markers, MigrateResult, Migration, MigrationEngine, MigrationError, MigrationFileManager,
    MigrationSet, Table,
};
use tidemark_sqlite::{SqliteConfig, SqliteDatabase, SqliteLedger};

type Engine = MigrationEngine<SqliteDatabase, SqliteLedger>;

async fn engine(migrations: Vec<Migration>) -> (Engine, SqliteDatabase) {
    let db = SqliteDatabase::open(SqliteConfig::memory()).await.unwrap();
    let ledger = db.ledger("_tidemark_migrations");
    let engine = MigrationEngine::new(db.clone(), ledger, MigrationSet::new(migrations).unwrap());
    (engine, db)
}

fn sql(version: i64, name: &str, source: &str) -> Migration {
    Migration::sql(version, name, source, &Markers::default(), true).unwrap()
}

async fn tables(db: &SqliteDatabase) -> Vec<String> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' AND name != '_tidemark_migrations' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(names)
        })
        .await
        .unwrap()
}

async fn applied(engine: &Engine) -> Vec<i64> {
    engine
        .ledger()
        .applied()
        .await
        .unwrap()
        .versions()
        .into_iter()
        .collect()
}

fn users_table() -> Table {
    Table::new("users")
        .column(Column::new("id", ColumnType::BigInt).primary_key())
        .column(Column::new("email", ColumnType::Text).unique())
}

#[tokio::test]
async fn test_round_trip_restores_schema() {
    let (engine, db) = engine(vec![
        Migration::change(1, "create_users", |ctx| {
            Box::pin(async move { ctx.create_table(&users_table()).await })
        }),
        sql(
            2,
            "create_posts",
            "-- migrate:up\nCREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER);\n\
             -- migrate:down\nDROP TABLE posts;\n",
        ),
        Migration::change(3, "index_and_rename", |ctx| {
            Box::pin(async move {
                ctx.create_index(&Index::new("users_email_idx", "users", ["email"]))
                    .await?;
                ctx.rename_table("posts", "articles").await
            })
        }),
        Migration::change(4, "add_title", |ctx| {
            Box::pin(async move {
                ctx.add_column("articles", &Column::new("title", ColumnType::Text).nullable())
                    .await
            })
        }),
    ])
    .await;

    let results = engine.up(ExecutionOptions::new()).await.unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(tables(&db).await, vec!["articles", "users"]);
    assert_eq!(applied(&engine).await, vec![1, 2, 3, 4]);

    let results = engine
        .down(ExecutionOptions::new().steps(0))
        .await
        .unwrap();
    let order: Vec<i64> = results.iter().map(|r| r.migration.version).collect();
    assert_eq!(order, vec![4, 3, 2, 1]);
    assert!(results.iter().all(|r| r.is_success()));
    assert!(tables(&db).await.is_empty());
    assert!(applied(&engine).await.is_empty());
}

#[tokio::test]
async fn test_failure_halts_and_rolls_back() {
    let (engine, db) = engine(vec![
        sql(1, "a", "-- migrate:up\nCREATE TABLE a (id INTEGER);\n"),
        sql(
            2,
            "b",
            "-- migrate:up\nCREATE TABLE b (id INTEGER);\nINSERT INTO missing VALUES (1);\n",
        ),
        sql(3, "c", "-- migrate:up\nCREATE TABLE c (id INTEGER);\n"),
    ])
    .await;

    let results = engine.up(ExecutionOptions::new()).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_success());
    assert!(matches!(results[1].error, Some(MigrationError::Database(_))));
    assert_eq!(tables(&db).await, vec!["a"]);
    assert_eq!(applied(&engine).await, vec![1]);
}

#[tokio::test]
async fn test_dry_run_discards_everything() {
    let (engine, db) = engine(vec![
        sql(1, "a", "-- migrate:up\nCREATE TABLE a (id INTEGER);\n"),
        sql(2, "b", "-- migrate:up\nINSERT INTO missing VALUES (1);\n"),
    ])
    .await;

    let results = engine
        .up(ExecutionOptions::new().dry_run(true))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_success() && r.dry_run));
    assert!(!results[1].warnings.is_empty());
    assert!(tables(&db).await.is_empty());
    assert!(applied(&engine).await.is_empty());
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let (engine, _db) = engine(vec![sql(1, "a", "-- migrate:up\nCREATE TABLE a (id INTEGER);\n")]).await;

    assert_eq!(engine.up(ExecutionOptions::new()).await.unwrap().len(), 1);
    assert!(engine.up(ExecutionOptions::new()).await.unwrap().is_empty());
    assert_eq!(applied(&engine).await, vec![1]);
}

#[tokio::test]
async fn test_explicit_version_preconditions() {
    let (engine, _db) = engine(vec![
        sql(1, "a", "-- migrate:up\nCREATE TABLE a (id INTEGER);\n-- migrate:down\nDROP TABLE a;\n"),
        sql(2, "b", "-- migrate:up\nCREATE TABLE b (id INTEGER);\n-- migrate:down\nDROP TABLE b;\n"),
    ])
    .await;

    let err = engine
        .run(Direction::Down, ExecutionOptions::new().target(1))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, MigrationError::NotApplied(1)));

    let results = engine
        .up(ExecutionOptions::new().target(2))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(applied(&engine).await, vec![2]);

    let err = engine
        .run(Direction::Up, ExecutionOptions::new().target(2))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, MigrationError::AlreadyApplied(2)));

    let err = engine
        .run(Direction::Up, ExecutionOptions::new().target(9))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, MigrationError::VersionNotFound(9)));
}

#[tokio::test]
async fn test_reversible_block_and_raw_sql() {
    let (engine, db) = engine(vec![
        Migration::change(1, "create_roles", |ctx| {
            Box::pin(async move {
                let roles =
                    Table::new("roles").column(Column::new("name", ColumnType::Text).primary_key());
                ctx.create_table(&roles).await
            })
        }),
        Migration::change(2, "seed_roles", |ctx| {
            Box::pin(async move {
                ctx.reversible(
                    |ctx| {
                        Box::pin(async move { ctx.execute("INSERT INTO roles VALUES ('admin')").await })
                    },
                    |ctx| Box::pin(async move { ctx.execute("DELETE FROM roles").await }),
                )
                .await?;
                ctx.execute("UPDATE roles SET name = 'root'").await
            })
        }),
    ])
    .await;

    let results = engine.up(ExecutionOptions::new()).await.unwrap();
    assert!(results.iter().all(|r| r.is_success() && r.warnings.is_empty()));
    assert_eq!(role_count(&db).await, 1);

    let results = engine.down(ExecutionOptions::new()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_success());
    assert_eq!(results[0].warnings.len(), 1);
    assert!(results[0].warnings[0].contains("UPDATE roles"));
    assert_eq!(role_count(&db).await, 0);
    assert_eq!(applied(&engine).await, vec![1]);
}

async fn role_count(db: &SqliteDatabase) -> i64 {
    db.connection()
        .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM roles", [], |row| row.get(0))?))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_continue_on_error_records_warnings() {
    let (engine, db) = engine(vec![Migration::functions(
        1,
        "lenient",
        |ctx| {
            Box::pin(async move {
                ctx.execute("CREATE TABLE a (id INTEGER)").await?;
                ctx.execute("INSERT INTO missing VALUES (1)").await?;
                ctx.execute("CREATE TABLE b (id INTEGER)").await
            })
        },
        |ctx| Box::pin(async move { ctx.execute("DROP TABLE a; DROP TABLE b").await }),
    )])
    .await;

    let results = engine
        .up(ExecutionOptions::new().continue_on_error(true))
        .await
        .unwrap();

    assert!(results[0].is_success());
    assert_eq!(results[0].warnings.len(), 1);
    assert_eq!(tables(&db).await, vec!["a", "b"]);
}

fn boom() -> MigrateResult<()> {
    panic!("boom")
}

#[tokio::test]
async fn test_panic_is_contained() {
    let (engine, db) = engine(vec![Migration::functions(
        1,
        "explodes",
        |ctx| {
            Box::pin(async move {
                ctx.execute("CREATE TABLE a (id INTEGER)").await?;
                boom()
            })
        },
        |_ctx| Box::pin(async move { Ok(()) }),
    )])
    .await;

    let results = engine.up(ExecutionOptions::new()).await.unwrap();

    assert!(matches!(&results[0].error, Some(MigrationError::Panicked(msg)) if msg.contains("boom")));
    assert!(tables(&db).await.is_empty());
    assert!(applied(&engine).await.is_empty());

    // the connection is usable afterwards
    let results = engine.up(ExecutionOptions::new()).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_cancelled_run_executes_nothing() {
    let (engine, db) = engine(vec![sql(1, "a", "-- migrate:up\nCREATE TABLE a (id INTEGER);\n")]).await;

    let token = CancellationToken::new();
    token.cancel();
    let results = engine
        .up(ExecutionOptions::new().cancellation(token).timeout(Duration::from_secs(5)))
        .await
        .unwrap();

    assert!(matches!(results[0].error, Some(MigrationError::Cancelled)));
    assert!(tables(&db).await.is_empty());
}

const SPIN: &str = "-- migrate:up\n\
    CREATE TABLE spin AS WITH RECURSIVE c(x) AS \
    (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 1000000000) \
    SELECT count(*) AS n FROM c;\n";

#[tokio::test]
async fn test_timeout_interrupts_running_statement() {
    let (engine, db) = engine(vec![
        sql(1, "spin", SPIN),
        sql(2, "b", "-- migrate:up\nCREATE TABLE b (id INTEGER);\n"),
    ])
    .await;

    let started = std::time::Instant::now();
    let results = engine
        .up(ExecutionOptions::new().timeout(Duration::from_millis(100)))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(3), "run took {:?}", elapsed);
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].error, Some(MigrationError::Timeout(_))));
    assert!(tables(&db).await.is_empty());
    assert!(applied(&engine).await.is_empty());

    let results = engine.up(ExecutionOptions::new().target(2)).await.unwrap();
    assert!(results[0].is_success());
    assert_eq!(tables(&db).await, vec!["b"]);
}

#[tokio::test]
async fn test_cancel_interrupts_running_statement() {
    let (engine, db) = engine(vec![sql(1, "spin", SPIN)]).await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let results = engine.up(ExecutionOptions::new().cancellation(token)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(matches!(results[0].error, Some(MigrationError::Cancelled)));
    assert!(tables(&db).await.is_empty());
    assert!(applied(&engine).await.is_empty());
}

#[tokio::test]
async fn test_sql_files_from_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");

    std::fs::write(
        dir.path().join("20240101000000_create_items.sql"),
        "-- created by hand\n\
         -- migrate:up\n\
         CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT DEFAULT 'a;b', updated_at TEXT);\n\
         -- tidemark:statement:begin\n\
         CREATE TRIGGER items_touch AFTER UPDATE ON items BEGIN\n\
           UPDATE items SET updated_at = CURRENT_TIMESTAMP WHERE id = NEW.id;\n\
         END;\n\
         -- tidemark:statement:end\n\
         -- migrate:down\n\
         DROP TRIGGER items_touch;\n\
         DROP TABLE items;\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("20240102000000_vacuum.sql"),
        "-- migrate:up tx=false\nVACUUM;\n-- migrate:down tx=false\nVACUUM;\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let migrations = MigrationFileManager::new(dir.path()).load().await.unwrap();
    assert_eq!(migrations.len(), 2);

    let db = SqliteDatabase::open(SqliteConfig::file(&path)).await.unwrap();
    let ledger = db.ledger("_tidemark_migrations");
    let engine = MigrationEngine::new(db.clone(), ledger, migrations);

    let results = engine.up(ExecutionOptions::new()).await.unwrap();
    assert!(results.iter().all(|r| r.is_success()), "{:?}", results);
    assert_eq!(tables(&db).await, vec!["items"]);

    let statuses = engine.status().await.unwrap();
    assert!(statuses.iter().all(|s| s.applied && s.applied_at.is_some()));

    let results = engine
        .down(ExecutionOptions::new().steps(0))
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_success()), "{:?}", results);
    assert!(tables(&db).await.is_empty());
}
