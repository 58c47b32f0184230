//! `tidemark down` - revert applied migrations.

use tidemark_migrate::{Database, Direction, ExecutionOptions, LedgerDriver, MigrationEngine};

use crate::cli::DownArgs;
use crate::commands::{self, Backend, with_engine};
use crate::config::Config;
use crate::error::CliResult;
use crate::output;

/// Run the down command
pub async fn run(config: Config, args: DownArgs) -> CliResult<()> {
    output::header("Migrate Down");

    let migrations = commands::load_migrations(&config).await?;
    let mut options = commands::execution_options(&args.run, commands::cancel_on_ctrl_c());
    if args.all {
        options = options.steps(0);
    }
    let confirm = !args.yes && !options.dry_run;

    let backend = Backend::connect(&config).await?;
    with_engine!(backend, config, migrations, |engine| {
        revert(&engine, options, confirm).await
    })
}

async fn revert<D: Database, L: LedgerDriver>(
    engine: &MigrationEngine<D, L>,
    options: ExecutionOptions,
    confirm: bool,
) -> CliResult<()> {
    if confirm {
        let plan = engine.plan(Direction::Down, &options).await?;
        if plan.is_empty() {
            output::success("Nothing to revert.");
            return Ok(());
        }

        output::warn("The following migrations will be reverted:");
        for migration in &plan {
            output::list_item(&migration.full_name());
        }
        output::newline();

        if !output::confirm("Revert these migrations?") {
            output::newline();
            output::info("Revert cancelled.");
            return Ok(());
        }
        output::newline();
    }

    commands::execute(engine, Direction::Down, options).await
}
