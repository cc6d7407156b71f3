//! SQLite migration registry and runner.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically (`upgrade`) and revert them
//!   newest-first (`downgrade`).
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - `upgrade` on an up-to-date database is a no-op.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "init",
        up: include_str!("0001_init.sql"),
        down: include_str!("0001_init.down.sql"),
    },
    Migration {
        version: 2,
        name: "project_address",
        up: include_str!("0002_project_address.sql"),
        down: include_str!("0002_project_address.down.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Returns the migration version recorded in the database.
pub fn current_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Applies all pending migrations on the provided connection.
pub fn upgrade(conn: &mut Connection) -> DbResult<()> {
    let current = current_version(conn)?;
    let latest = latest_version();

    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }

    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }

        tx.execute_batch(migration.up)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        info!(
            "event=db_upgrade module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    Ok(())
}

/// Reverts applied migrations newest-first until `target` is reached.
///
/// # Errors
/// - [`DbError::UnknownMigrationTarget`] when `target` is above the current
///   version.
pub fn downgrade(conn: &mut Connection, target: u32) -> DbResult<()> {
    let current = current_version(conn)?;
    if target > current {
        return Err(DbError::UnknownMigrationTarget { target, current });
    }
    if current > latest_version() {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest_version(),
        });
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().rev() {
        if migration.version <= target || migration.version > current {
            continue;
        }

        tx.execute_batch(migration.down)?;
        info!(
            "event=db_downgrade module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    tx.execute_batch(&format!("PRAGMA user_version = {target};"))?;
    tx.commit()?;

    Ok(())
}
