//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory connections for the rusqlite and diesel drivers.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout.
//! - Returned connections have migrations fully applied.

use super::migrations::{apply_migrations, apply_migrations_diesel};
use super::{DbError, DbResult};
use diesel::connection::SimpleConnection;
use diesel::{Connection as _, SqliteConnection};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// How long a writer waits on a locked database before failing with I/O.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_logged("rusqlite", "file", || {
        let mut conn = Connection::open(path).map_err(DbError::from)?;
        bootstrap_connection(&mut conn)?;
        Ok(conn)
    })
}

/// Opens an in-memory SQLite database and applies all pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_logged("rusqlite", "memory", || {
        let mut conn = Connection::open_in_memory().map_err(DbError::from)?;
        bootstrap_connection(&mut conn)?;
        Ok(conn)
    })
}

/// Establishes a diesel connection and applies all pending migrations.
///
/// `database` is a file path or `:memory:`.
pub fn open_diesel(database: &str) -> DbResult<SqliteConnection> {
    let mode = if database == super::IN_MEMORY_DATABASE {
        "memory"
    } else {
        "file"
    };
    open_logged("diesel", mode, || {
        let mut conn = SqliteConnection::establish(database)?;
        conn.batch_execute(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT.as_millis()
        ))?;
        apply_migrations_diesel(&mut conn)?;
        Ok(conn)
    })
}

fn open_logged<C>(
    driver: &str,
    mode: &str,
    open: impl FnOnce() -> DbResult<C>,
) -> DbResult<C> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start driver={driver} mode={mode}");

    match open() {
        Ok(conn) => {
            info!(
                "event=db_open module=db status=ok driver={} mode={} duration_ms={}",
                driver,
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error driver={} mode={} duration_ms={} error_code={} error={}",
                driver,
                mode,
                started_at.elapsed().as_millis(),
                error_code(&err),
                err
            );
            Err(err)
        }
    }
}

fn error_code(err: &DbError) -> &'static str {
    match err {
        DbError::Sqlite(_) | DbError::DieselConnection(_) => "db_open_failed",
        DbError::Diesel(_)
        | DbError::UnsupportedSchemaVersion { .. }
        | DbError::InvalidSchemaVersion(_) => "db_bootstrap_failed",
    }
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_migrations(conn)?;
    Ok(())
}
