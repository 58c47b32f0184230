//! Migration file management.
//!
//! SQL migrations live in one directory, one file per migration:
//!
//! ```text
//! migrations/
//! ├── 20240101120000_create_users.sql
//! └── 20240102093000_add_posts.sql
//! ```

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::engine::MigrationConfig;
use crate::error::{MigrateResult, MigrationError};
use crate::migration::{Migration, MigrationSet, parse_file_name};
use crate::parser::Markers;

/// Migration file reader/writer.
#[derive(Debug, Clone)]
pub struct MigrationFileManager {
    directory: PathBuf,
    markers: Markers,
    transactional: bool,
}

impl MigrationFileManager {
    /// Create a new file manager with default markers.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            markers: Markers::default(),
            transactional: true,
        }
    }

    /// Create a file manager from the engine configuration.
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            markers: config.markers.clone(),
            transactional: config.transactional,
        }
    }

    /// Get the migrations directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Ensure the migrations directory exists.
    pub async fn ensure_dir(&self) -> MigrateResult<()> {
        tokio::fs::create_dir_all(&self.directory).await?;
        Ok(())
    }

    /// List migration files in version order.
    ///
    /// Entries without a `.sql` extension are ignored. A `.sql` file whose
    /// name is not `<version>_<name>.sql` is an error.
    pub async fn list_files(&self) -> MigrateResult<Vec<(i64, PathBuf)>> {
        let mut files = Vec::new();

        if !tokio::fs::try_exists(&self.directory).await? {
            return Ok(files);
        }

        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }

            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let (version, _) = parse_file_name(&file_name).ok_or_else(|| {
                MigrationError::migration_file(format!(
                    "Invalid migration file name '{}', expected <version>_<name>.sql",
                    file_name
                ))
            })?;
            files.push((version, path));
        }

        files.sort_by_key(|(version, _)| *version);
        Ok(files)
    }

    /// Load and validate every migration in the directory.
    pub async fn load(&self) -> MigrateResult<MigrationSet> {
        let files = self.list_files().await?;
        let mut migrations = Vec::with_capacity(files.len());

        for (_, path) in files {
            debug!(path = %path.display(), "loading migration");
            migrations.push(Migration::from_file(&path, &self.markers, self.transactional).await?);
        }

        MigrationSet::new(migrations)
    }

    /// Write a new, empty migration file and return its path.
    pub async fn generate(&self, name: &str) -> MigrateResult<PathBuf> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(MigrationError::migration_file(
                "Migration name must contain letters or digits",
            ));
        }

        self.ensure_dir().await?;

        let version = self.generate_version();
        if self.list_files().await?.iter().any(|(v, _)| *v == version) {
            return Err(MigrationError::DuplicateVersion(version));
        }

        let path = self.directory.join(format!("{}_{}.sql", version, name));
        tokio::fs::write(&path, self.template()).await?;

        info!(path = %path.display(), "created migration file");
        Ok(path)
    }

    /// Generate a new migration version from the current UTC time.
    pub fn generate_version(&self) -> i64 {
        Utc::now()
            .format("%Y%m%d%H%M%S")
            .to_string()
            .parse()
            .unwrap_or_default()
    }

    fn template(&self) -> String {
        format!("{}\n\n\n{}\n\n", self.markers.up, self.markers.down)
    }
}

/// Lowercase a migration name and replace anything but letters and digits.
fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}
