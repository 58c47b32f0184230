//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Tidemark - database schema migrations
#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(version)]
#[command(about = "Tidemark - database schema migrations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Database URL (sqlite://..., postgres://...)
    #[arg(long, global = true, env = "TIDEMARK_DATABASE_URL", hide_env_values = true)]
    pub dsn: Option<String>,

    /// Path to the configuration file (defaults to ./tidemark.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending migrations
    Up(UpArgs),

    /// Revert applied migrations
    Down(DownArgs),

    /// Show which migrations are applied
    Status,

    /// Create a new migration file
    Generate(GenerateArgs),

    /// Print the effective configuration
    ShowConfig,
}

/// Options shared by `up` and `down`
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Number of migrations to run
    #[arg(short = 'n', long)]
    pub steps: Option<i32>,

    /// Run only this version
    #[arg(long, value_name = "VERSION", conflicts_with = "steps")]
    pub target: Option<i64>,

    /// Run inside transactions that are always rolled back
    #[arg(long)]
    pub dry_run: bool,

    /// Log failing statements as warnings and keep going
    #[arg(long)]
    pub continue_on_error: bool,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

/// Arguments for the `up` command
#[derive(Args, Debug)]
pub struct UpArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the `down` command
#[derive(Args, Debug)]
pub struct DownArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Revert every applied migration
    #[arg(long, conflicts_with_all = ["steps", "target"])]
    pub all: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the `generate` command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Name of the migration, e.g. `create_users`
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_down() {
        let cli = Cli::try_parse_from(["tidemark", "down", "--all", "--yes", "--dsn", "sqlite::memory:"])
            .unwrap();
        assert_eq!(cli.dsn.as_deref(), Some("sqlite::memory:"));
        match cli.command {
            Command::Down(args) => {
                assert!(args.all);
                assert!(args.yes);
                assert_eq!(args.run.steps, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_steps_conflict_with_target() {
        assert!(Cli::try_parse_from(["tidemark", "up", "--steps", "1", "--target", "5"]).is_err());
        assert!(Cli::try_parse_from(["tidemark", "down", "--all", "--steps", "2"]).is_err());
    }
}
