//! SQLite migration registry for the bundled risk-register schema.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - A database newer than this binary is rejected, never downgraded.

use crate::error::{classify_sqlite_error, DatabaseError, DbResult, ErrorKind};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_risk_register.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_risk_reviews.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations; returns the resulting schema version.
pub fn apply_migrations(conn: &Connection) -> DbResult<u32> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DatabaseError::configuration(format!(
            "database schema version {current_version} is newer than supported {latest}"
        ))
        .with_context("db_version", current_version.to_string())
        .with_context("latest_supported", latest.to_string()));
    }

    if current_version == latest {
        return Ok(latest);
    }

    let tx = conn.unchecked_transaction().map_err(map_sqlite)?;
    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql).map_err(map_sqlite)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))
            .map_err(map_sqlite)?;
    }
    tx.commit().map_err(map_sqlite)?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={}",
        current_version, latest
    );
    Ok(latest)
}

/// Reads `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))
        .map_err(map_sqlite)
}

fn map_sqlite(err: rusqlite::Error) -> DatabaseError {
    let (failure, kind) = classify_sqlite_error(&err);
    let kind = if kind == ErrorKind::UnknownError {
        ErrorKind::ConfigurationError
    } else {
        kind
    };
    DatabaseError::new(kind, format!("schema migration failed: {}", failure.message))
        .with_context("driver_code", failure.code.unwrap_or_default())
}
