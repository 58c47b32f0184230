//! SQLite configuration.

use std::path::{Path, PathBuf};

use crate::error::{SqliteError, SqliteResult};

/// SQLite database configuration.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database path (or ":memory:" for in-memory).
    pub path: DatabasePath,
    /// Enable foreign keys.
    pub foreign_keys: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u32>,
    /// Journal mode.
    pub journal_mode: JournalMode,
}

/// Database path configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabasePath {
    /// In-memory database.
    #[default]
    Memory,
    /// File-based database.
    File(PathBuf),
}

impl DatabasePath {
    /// Check if this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JournalMode {
    /// DELETE - Default SQLite mode.
    #[default]
    Delete,
    /// TRUNCATE - Truncates journal instead of deleting.
    Truncate,
    /// MEMORY - Keep journal in memory.
    Memory,
    /// WAL - Write-Ahead Logging.
    Wal,
}

impl JournalMode {
    /// Get the SQLite pragma value.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: DatabasePath::Memory,
            foreign_keys: true,
            busy_timeout_ms: Some(5000),
            journal_mode: JournalMode::Delete,
        }
    }
}

impl SqliteConfig {
    /// Create a new configuration for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a new configuration for a file-based database.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: DatabasePath::File(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Parse a SQLite URL into configuration.
    ///
    /// Supported formats:
    /// - `sqlite::memory:` or `:memory:` - In-memory database
    /// - `sqlite://path/to/db.sqlite` - File-based database
    /// - `sqlite:path/to/db.sqlite` - File-based database
    /// - `file:path/to/db.sqlite` - Alternative format
    ///
    /// Query parameters `foreign_keys`, `busy_timeout` and `journal_mode` are
    /// recognised.
    pub fn from_url(url: impl AsRef<str>) -> SqliteResult<Self> {
        let url_str = url.as_ref();
        let (location, query) = match url_str.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (url_str, None),
        };

        let path = if let Some(path) = location.strip_prefix("sqlite://") {
            path
        } else if let Some(path) = location.strip_prefix("sqlite:") {
            path
        } else if let Some(path) = location.strip_prefix("file:") {
            path
        } else if location.contains("://") {
            return Err(SqliteError::config(format!("not a SQLite URL: {}", url_str)));
        } else {
            location
        };

        let mut config = match path {
            "" => return Err(SqliteError::config("database path is required")),
            ":memory:" => Self::memory(),
            path => Self::file(path),
        };

        for pair in query.unwrap_or_default().split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "mode" if value == "memory" => config.path = DatabasePath::Memory,
                "foreign_keys" => config.foreign_keys = value == "true" || value == "1",
                "busy_timeout" => {
                    let ms = value
                        .parse()
                        .map_err(|_| SqliteError::config(format!("invalid busy_timeout: {}", value)))?;
                    config.busy_timeout_ms = Some(ms);
                }
                "journal_mode" => {
                    config.journal_mode = match value.to_lowercase().as_str() {
                        "delete" => JournalMode::Delete,
                        "truncate" => JournalMode::Truncate,
                        "memory" => JournalMode::Memory,
                        "wal" => JournalMode::Wal,
                        other => {
                            return Err(SqliteError::config(format!("invalid journal_mode: {}", other)));
                        }
                    };
                }
                _ => {}
            }
        }

        Ok(config)
    }

    /// Generate the initialization SQL for this configuration.
    pub fn init_sql(&self) -> String {
        let mut sql = String::new();

        if self.foreign_keys {
            sql.push_str("PRAGMA foreign_keys = ON;\n");
        }

        if !self.path.is_memory() {
            sql.push_str(&format!(
                "PRAGMA journal_mode = {};\n",
                self.journal_mode.as_pragma()
            ));
        }

        if let Some(timeout) = self.busy_timeout_ms {
            sql.push_str(&format!("PRAGMA busy_timeout = {};\n", timeout));
        }

        sql
    }

    /// Enable or disable foreign keys.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the busy timeout in milliseconds.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    /// Set the journal mode.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_urls() {
        assert!(SqliteConfig::from_url("sqlite::memory:").unwrap().path.is_memory());
        assert!(SqliteConfig::from_url(":memory:").unwrap().path.is_memory());
        assert!(
            SqliteConfig::from_url("sqlite://db.sqlite?mode=memory")
                .unwrap()
                .path
                .is_memory()
        );
    }

    #[test]
    fn test_file_urls() {
        for url in ["sqlite://./data/app.db", "sqlite:./data/app.db", "file:./data/app.db", "./data/app.db"] {
            let config = SqliteConfig::from_url(url).unwrap();
            assert_eq!(config.path, DatabasePath::File(PathBuf::from("./data/app.db")));
        }
    }

    #[test]
    fn test_query_parameters() {
        let config =
            SqliteConfig::from_url("sqlite://app.db?foreign_keys=false&busy_timeout=250&journal_mode=wal")
                .unwrap();

        assert!(!config.foreign_keys);
        assert_eq!(config.busy_timeout_ms, Some(250));
        assert_eq!(config.journal_mode, JournalMode::Wal);
    }

    #[test]
    fn test_invalid_urls() {
        assert!(SqliteConfig::from_url("sqlite://").is_err());
        assert!(SqliteConfig::from_url("postgres://localhost/db").is_err());
        assert!(SqliteConfig::from_url("sqlite://app.db?busy_timeout=soon").is_err());
    }

    #[test]
    fn test_init_sql() {
        let sql = SqliteConfig::file("app.db").journal_mode(JournalMode::Wal).init_sql();
        assert!(sql.contains("PRAGMA foreign_keys = ON"));
        assert!(sql.contains("PRAGMA journal_mode = WAL"));
        assert!(sql.contains("PRAGMA busy_timeout = 5000"));

        let sql = SqliteConfig::memory().foreign_keys(false).init_sql();
        assert!(!sql.contains("foreign_keys"));
        assert!(!sql.contains("journal_mode"));
    }
}
