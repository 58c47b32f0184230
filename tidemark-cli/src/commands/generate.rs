//! `tidemark generate` - scaffold a new migration file.

use tidemark_migrate::MigrationFileManager;

use crate::cli::GenerateArgs;
use crate::config::Config;
use crate::error::CliResult;
use crate::output;

/// Run the generate command
pub async fn run(config: Config, args: GenerateArgs) -> CliResult<()> {
    let manager = MigrationFileManager::from_config(&config.migrations);
    let path = manager.generate(&args.name).await?;

    output::success(&format!("Created {}", path.display()));
    Ok(())
}
