//! Version resolution.
//!
//! Pure functions over the known migrations and a ledger snapshot. Nothing
//! here touches the database, so every resolution error is reported before a
//! run mutates anything.

use tracing::warn;

use crate::direction::Direction;
use crate::error::{MigrateResult, MigrationError};
use crate::ledger::{LedgerState, MigrationRecord};
use crate::migration::{Migration, MigrationStatus};

/// Compute the migrations to run, in execution order.
///
/// `migrations` must be sorted by ascending version. `target` and `steps` are
/// mutually exclusive. Going up, a missing or non-positive `steps` means every
/// pending migration. Going down, a missing `steps` means one migration and a
/// non-positive one means every applied migration.
pub fn resolve<'m>(
    direction: Direction,
    migrations: &'m [Migration],
    ledger: &LedgerState,
    target: Option<i64>,
    steps: Option<i32>,
) -> MigrateResult<Vec<&'m Migration>> {
    if target.is_some() && steps.is_some() {
        return Err(MigrationError::invalid_options(
            "a target version and a step count cannot be combined",
        ));
    }

    if let Some(version) = target {
        let migration = migrations
            .iter()
            .find(|m| m.version == version)
            .ok_or(MigrationError::VersionNotFound(version))?;
        let applied = ledger.contains(version);
        return match (direction, applied) {
            (Direction::Up, true) => Err(MigrationError::AlreadyApplied(version)),
            (Direction::Down, false) => Err(MigrationError::NotApplied(version)),
            _ => Ok(vec![migration]),
        };
    }

    let applied = ledger.versions();
    match direction {
        Direction::Up => {
            let pending = migrations.iter().filter(|m| !applied.contains(&m.version));
            Ok(match steps {
                Some(n) if n > 0 => pending.take(n as usize).collect(),
                _ => pending.collect(),
            })
        }
        Direction::Down => {
            let limit = match steps {
                None => 1,
                Some(n) if n > 0 => n as usize,
                Some(_) => usize::MAX,
            };
            Ok(migrations
                .iter()
                .rev()
                .filter(|m| applied.contains(&m.version))
                .take(limit)
                .collect())
        }
    }
}

/// Pair every migration with its ledger record.
pub fn status<'m>(migrations: &'m [Migration], ledger: &LedgerState) -> Vec<MigrationStatus<'m>> {
    migrations
        .iter()
        .map(|m| {
            let record = ledger.get(m.version);
            MigrationStatus {
                migration: m,
                applied: record.is_some(),
                applied_at: record.map(|r| r.applied_at),
            }
        })
        .collect()
}

/// Ledger records with no matching migration.
pub fn orphaned<'l>(migrations: &[Migration], ledger: &'l LedgerState) -> Vec<&'l MigrationRecord> {
    let orphans: Vec<&MigrationRecord> = ledger
        .records()
        .iter()
        .filter(|r| !migrations.iter().any(|m| m.version == r.version))
        .collect();

    for record in &orphans {
        warn!(
            version = record.version,
            name = %record.name,
            "applied migration has no matching definition"
        );
    }

    orphans
}
