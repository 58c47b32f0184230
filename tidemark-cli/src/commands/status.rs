//! `tidemark status` - show applied and pending migrations.

use tidemark_migrate::{Database, LedgerDriver, MigrationEngine};

use crate::commands::{self, Backend, with_engine};
use crate::config::Config;
use crate::error::CliResult;
use crate::output;

/// Run the status command
pub async fn run(config: Config) -> CliResult<()> {
    output::header("Migration Status");

    let migrations = commands::load_migrations(&config).await?;
    let backend = Backend::connect(&config).await?;

    with_engine!(backend, config, migrations, |engine| report(&engine).await)
}

async fn report<D: Database, L: LedgerDriver>(engine: &MigrationEngine<D, L>) -> CliResult<()> {
    let statuses = engine.status().await?;
    let orphaned = engine.orphaned().await?;

    if statuses.is_empty() {
        output::info("No migrations found.");
    }
    for status in &statuses {
        output::status_row(status);
    }

    if !orphaned.is_empty() {
        output::newline();
        output::warn("Applied migrations missing from the migrations directory:");
        for record in &orphaned {
            output::list_item(&format!("{}_{}", record.version, record.name));
        }
    }

    let pending = statuses.iter().filter(|s| !s.applied).count();
    output::newline();
    output::kv("Applied", &(statuses.len() - pending).to_string());
    output::kv("Pending", &pending.to_string());
    Ok(())
}
