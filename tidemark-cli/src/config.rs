//! CLI configuration handling.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tidemark_migrate::MigrationConfig;

use crate::error::{CliError, CliResult};

/// Default config file name (lives in project root)
pub const CONFIG_FILE_NAME: &str = "tidemark.toml";

/// Tidemark CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Migration configuration
    pub migrations: MigrationConfig,
}

/// Database configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path must exist. Otherwise `tidemark.toml` in `dir` is used
    /// when present, and defaults apply when it is not. A DSN from the command
    /// line or the environment overrides the file.
    pub fn resolve(explicit: Option<&Path>, dir: &Path, dsn: Option<String>) -> CliResult<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let path: PathBuf = dir.join(CONFIG_FILE_NAME);
                if path.exists() {
                    Self::load(&path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Some(dsn) = dsn {
            config.database.url = Some(dsn);
        }

        Ok(config)
    }

    /// The database URL, or an error explaining how to set one
    pub fn database_url(&self) -> CliResult<&str> {
        self.database.url.as_deref().ok_or_else(|| {
            CliError::Config(
                "no database URL; pass --dsn, set TIDEMARK_DATABASE_URL or add [database] url to tidemark.toml"
                    .to_string(),
            )
        })
    }

    /// Render as TOML with any password in the URL masked
    pub fn to_display_toml(&self) -> CliResult<String> {
        let mut shown = self.clone();
        shown.database.url = shown.database.url.as_deref().map(redact_url);
        Ok(toml::to_string_pretty(&shown)?)
    }
}

/// Mask the password of a URL, leaving anything unparsable untouched.
fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("****")).is_ok() {
                parsed.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}
