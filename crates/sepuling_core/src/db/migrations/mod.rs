//! SQLite migration registry and executors.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically through either driver.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use diesel::connection::SimpleConnection;
use diesel::sql_types::Integer;
use diesel::{Connection as _, QueryableByName, RunQueryDsl, SqliteConnection};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("0001_init.sql"),
}];

#[derive(QueryableByName)]
struct UserVersion {
    #[diesel(sql_type = Integer)]
    user_version: i32,
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Returns migrations newer than `current_version`, oldest first.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database is ahead of this binary.
pub fn pending_migrations(current_version: u32) -> DbResult<Vec<Migration>> {
    let latest = latest_version();
    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    Ok(MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current_version)
        .copied()
        .collect())
}

/// Applies all pending migrations on a rusqlite connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let pending = pending_migrations(current_version)?;
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in &pending {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok driver=rusqlite from={} to={}",
        current_version,
        latest_version()
    );
    Ok(())
}

/// Applies all pending migrations on a diesel connection.
pub fn apply_migrations_diesel(conn: &mut SqliteConnection) -> DbResult<()> {
    let stored = diesel::sql_query("PRAGMA user_version;")
        .get_result::<UserVersion>(conn)?
        .user_version;
    let current_version = schema_version(i64::from(stored))?;
    let pending = pending_migrations(current_version)?;
    if pending.is_empty() {
        return Ok(());
    }

    conn.transaction::<_, diesel::result::Error, _>(|tx| {
        for migration in &pending {
            tx.batch_execute(migration.sql)?;
            tx.batch_execute(&format!("PRAGMA user_version = {};", migration.version))?;
        }
        Ok(())
    })?;

    info!(
        "event=db_migrate module=db status=ok driver=diesel from={} to={}",
        current_version,
        latest_version()
    );
    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let stored = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, i64>(0))?;
    schema_version(stored)
}

/// Interprets a raw `PRAGMA user_version` value the same way for both drivers.
fn schema_version(stored: i64) -> DbResult<u32> {
    u32::try_from(stored).map_err(|_| DbError::InvalidSchemaVersion(stored))
}
