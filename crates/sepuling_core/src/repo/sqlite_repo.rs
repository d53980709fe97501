//! Hand-written SQL implementation of the sepulka storage port.
//!
//! # Responsibility
//! - Keep every statement against `sepulkas` explicit and parameterized.
//! - Select only the columns each projection carries.
//!
//! # Invariants
//! - The conditional update is one statement; no read precedes it.
//! - Rows read back are validated before they leave this module.

use crate::db::{open_db, open_db_in_memory};
use crate::model::sepulka::{Existence, Preview, Sepulka, SepulkaId, Touch};
use crate::repo::sepulka_repo::{parse_internal_id, RepoError, RepoResult, SepulkaRepository};
use log::{debug, error, warn};
use rusqlite::{ffi, params, Connection};
use std::path::Path;

/// Rusqlite-backed sepulka repository.
///
/// Owns its connection, so each thread that needs concurrent access opens
/// its own repository against the same database file.
pub struct SqliteSepulkaRepository {
    conn: Connection,
}

impl SqliteSepulkaRepository {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> RepoResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }
}

impl SepulkaRepository for SqliteSepulkaRepository {
    fn add(&self, sepulka: &Sepulka) -> RepoResult<Sepulka> {
        sepulka.validate()?;

        let inserted = self.conn.execute(
            "INSERT INTO sepulkas (
                internal_id,
                external_id,
                revision,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                sepulka.internal_id.to_string(),
                sepulka.external_id.as_str(),
                sepulka.revision,
                sepulka.created_at,
                sepulka.updated_at,
            ],
        );

        match inserted {
            Ok(_) => {
                debug!(
                    "event=sepulka_add module=repo status=ok backend=sql internal_id={}",
                    sepulka.internal_id
                );
                Ok(sepulka.clone())
            }
            Err(err) => {
                let err = map_insert_error(err);
                if err.is_duplicate_key() {
                    warn!(
                        "event=sepulka_add module=repo status=error backend=sql error_code=duplicate_key internal_id={}",
                        sepulka.internal_id
                    );
                } else {
                    error!(
                        "event=sepulka_add module=repo status=error backend=sql error_code=db_error error={}",
                        err
                    );
                }
                Err(err)
            }
        }
    }

    fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<Existence>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                internal_id,
                external_id
             FROM sepulkas
             WHERE external_id = ?1;",
        )?;

        let mut rows = stmt.query([external_id])?;
        if let Some(row) = rows.next()? {
            let internal_id: String = row.get("internal_id")?;
            return Ok(Some(Existence {
                internal_id: parse_internal_id(&internal_id)?,
                external_id: row.get("external_id")?,
            }));
        }

        Ok(None)
    }

    fn find_by_internal_id(&self, internal_id: SepulkaId) -> RepoResult<Option<Preview>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                internal_id,
                external_id,
                created_at
             FROM sepulkas
             WHERE internal_id = ?1;",
        )?;

        let mut rows = stmt.query([internal_id.to_string()])?;
        if let Some(row) = rows.next()? {
            let stored_id: String = row.get("internal_id")?;
            return Ok(Some(Preview {
                internal_id: parse_internal_id(&stored_id)?,
                external_id: row.get("external_id")?,
                created_at: row.get("created_at")?,
            }));
        }

        Ok(None)
    }

    fn update_by(&self, internal_id: SepulkaId, touch: &Touch) -> RepoResult<()> {
        let next_revision = touch.next_revision()?;

        let changed = self.conn.execute(
            "UPDATE sepulkas
             SET
                revision = revision + 1,
                updated_at = ?1
             WHERE internal_id = ?2
               AND revision = ?3;",
            params![touch.updated_at, internal_id.to_string(), touch.revision],
        )?;

        if changed == 0 {
            warn!(
                "event=sepulka_update module=repo status=error backend=sql error_code=contention internal_id={} observed_revision={}",
                internal_id, touch.revision
            );
            return Err(RepoError::Contention {
                internal_id,
                observed_revision: touch.revision,
            });
        }

        debug!(
            "event=sepulka_update module=repo status=ok backend=sql internal_id={} revision={}",
            internal_id, next_revision
        );
        Ok(())
    }
}

fn map_insert_error(err: rusqlite::Error) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
            || failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            return RepoError::duplicate_key(message.as_deref().unwrap_or_default());
        }
    }
    err.into()
}
