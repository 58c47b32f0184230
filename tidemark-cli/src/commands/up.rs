//! `tidemark up` - apply pending migrations.

use tidemark_migrate::Direction;

use crate::cli::UpArgs;
use crate::commands::{self, Backend, with_engine};
use crate::config::Config;
use crate::error::CliResult;
use crate::output;

/// Run the up command
pub async fn run(config: Config, args: UpArgs) -> CliResult<()> {
    output::header("Migrate Up");

    let migrations = commands::load_migrations(&config).await?;
    output::kv("Migrations", &config.migrations.directory.display().to_string());
    output::kv("Found", &migrations.len().to_string());
    output::newline();

    let options = commands::execution_options(&args.run, commands::cancel_on_ctrl_c());
    let backend = Backend::connect(&config).await?;

    with_engine!(backend, config, migrations, |engine| {
        commands::execute(&engine, Direction::Up, options).await
    })
}
