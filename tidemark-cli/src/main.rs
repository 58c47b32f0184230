//! Tidemark CLI - database schema migrations.

use clap::Parser;

use tidemark_cli::cli::{Cli, Command};
use tidemark_cli::commands;
use tidemark_cli::config::Config;
use tidemark_cli::error::CliResult;
use tidemark_cli::{logging, output};

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir()?;
    let config = Config::resolve(cli.config.as_deref(), &cwd, cli.dsn)?;

    match cli.command {
        Command::Up(args) => commands::up::run(config, args).await,
        Command::Down(args) => commands::down::run(config, args).await,
        Command::Status => commands::status::run(config).await,
        Command::Generate(args) => commands::generate::run(config, args).await,
        Command::ShowConfig => commands::show_config::run(&config),
    }
}
