//! Logging setup for the CLI.
//!
//! # Environment Variables
//!
//! - `TIDEMARK_DEBUG=true|1|yes` - Enable debug logging
//! - `TIDEMARK_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific log level
//! - `TIDEMARK_LOG_FORMAT=compact|pretty|json` - Set the output format (default: compact)
//!
//! Without either of the first two, only warnings are printed.

use std::env;
use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `TIDEMARK_DEBUG`.
pub fn is_debug_enabled() -> bool {
    env::var("TIDEMARK_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// The configured log level.
pub fn log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("TIDEMARK_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// The configured log format.
pub fn log_format() -> &'static str {
    env::var("TIDEMARK_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "json" => "json",
            _ => "compact",
        })
        .unwrap_or("compact")
}

/// Install the global subscriber. Subsequent calls are no-ops.
pub fn init() {
    INIT.call_once(|| {
        let level = log_level();
        let filter = EnvFilter::try_new(format!(
            "tidemark={level},tidemark_migrate={level},tidemark_sqlite={level},tidemark_postgres={level},tidemark_cli={level}"
        ))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

        let registry = tracing_subscriber::registry().with(filter);
        let result = match log_format() {
            "json" => registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init(),
            "pretty" => registry
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init(),
            _ => registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init(),
        };

        if result.is_ok() {
            tracing::debug!(level, format = log_format(), "logging initialized");
        }
    });
}
