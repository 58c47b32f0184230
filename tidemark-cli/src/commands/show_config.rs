//! `tidemark show-config` - print the effective configuration.

use crate::config::Config;
use crate::error::CliResult;

/// Run the show-config command
pub fn run(config: &Config) -> CliResult<()> {
    print!("{}", config.to_display_toml()?);
    Ok(())
}
