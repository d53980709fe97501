//! Diesel implementation of the sepulka storage port.
//!
//! # Responsibility
//! - Map `sepulkas` rows to and from typed row structs.
//! - Express every operation through diesel's query builder.
//!
//! # Invariants
//! - Row structs stay private; only domain types cross this boundary.
//! - Each projection has its own `Selectable` row, so finders never load
//!   columns their projection does not carry.
//! - The conditional update is a single filtered `UPDATE`, never a
//!   load-modify-save.

use crate::db::{open_diesel, IN_MEMORY_DATABASE};
use crate::model::sepulka::{Existence, Preview, Sepulka, SepulkaId, Touch};
use crate::repo::sepulka_repo::{parse_internal_id, RepoError, RepoResult, SepulkaRepository};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use diesel::{
    ExpressionMethods, Insertable, OptionalExtension, QueryDsl, Queryable, RunQueryDsl,
    Selectable, SelectableHelper,
};
use log::{debug, error, warn};
use std::cell::RefCell;

mod schema {
    diesel::table! {
        sepulkas (internal_id) {
            internal_id -> Text,
            external_id -> Text,
            revision -> BigInt,
            created_at -> BigInt,
            updated_at -> BigInt,
        }
    }
}

use schema::sepulkas;

#[derive(Debug, Insertable)]
#[diesel(table_name = sepulkas)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct NewSepulkaRow<'a> {
    internal_id: String,
    external_id: &'a str,
    revision: i64,
    created_at: i64,
    updated_at: i64,
}

impl<'a> From<&'a Sepulka> for NewSepulkaRow<'a> {
    fn from(value: &'a Sepulka) -> Self {
        Self {
            internal_id: value.internal_id.to_string(),
            external_id: value.external_id.as_str(),
            revision: value.revision,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = sepulkas)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct ExistenceRow {
    internal_id: String,
    external_id: String,
}

impl TryFrom<ExistenceRow> for Existence {
    type Error = RepoError;

    fn try_from(row: ExistenceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            internal_id: parse_internal_id(&row.internal_id)?,
            external_id: row.external_id,
        })
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = sepulkas)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct PreviewRow {
    internal_id: String,
    external_id: String,
    created_at: i64,
}

impl TryFrom<PreviewRow> for Preview {
    type Error = RepoError;

    fn try_from(row: PreviewRow) -> Result<Self, Self::Error> {
        Ok(Self {
            internal_id: parse_internal_id(&row.internal_id)?,
            external_id: row.external_id,
            created_at: row.created_at,
        })
    }
}

/// Diesel-backed sepulka repository.
///
/// Diesel queries need `&mut SqliteConnection`; the cell lends it out for
/// the duration of one statement and is never held across calls.
pub struct DieselSepulkaRepository {
    conn: RefCell<SqliteConnection>,
}

impl DieselSepulkaRepository {
    /// Wraps an already migrated connection.
    pub fn new(conn: SqliteConnection) -> Self {
        Self {
            conn: RefCell::new(conn),
        }
    }

    /// Establishes (and migrates) a database file or `:memory:`.
    pub fn open(database: &str) -> RepoResult<Self> {
        Ok(Self::new(open_diesel(database)?))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> RepoResult<Self> {
        Self::open(IN_MEMORY_DATABASE)
    }
}

impl SepulkaRepository for DieselSepulkaRepository {
    fn add(&self, sepulka: &Sepulka) -> RepoResult<Sepulka> {
        sepulka.validate()?;

        let inserted = diesel::insert_into(sepulkas::table)
            .values(NewSepulkaRow::from(sepulka))
            .execute(&mut *self.conn.borrow_mut());

        match inserted {
            Ok(_) => {
                debug!(
                    "event=sepulka_add module=repo status=ok backend=orm internal_id={}",
                    sepulka.internal_id
                );
                Ok(sepulka.clone())
            }
            Err(err) => {
                let err = map_insert_error(err);
                if err.is_duplicate_key() {
                    warn!(
                        "event=sepulka_add module=repo status=error backend=orm error_code=duplicate_key internal_id={}",
                        sepulka.internal_id
                    );
                } else {
                    error!(
                        "event=sepulka_add module=repo status=error backend=orm error_code=db_error error={}",
                        err
                    );
                }
                Err(err)
            }
        }
    }

    fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<Existence>> {
        let row = sepulkas::table
            .filter(sepulkas::external_id.eq(external_id))
            .select(ExistenceRow::as_select())
            .first(&mut *self.conn.borrow_mut())
            .optional()?;

        row.map(Existence::try_from).transpose()
    }

    fn find_by_internal_id(&self, internal_id: SepulkaId) -> RepoResult<Option<Preview>> {
        let row = sepulkas::table
            .filter(sepulkas::internal_id.eq(internal_id.to_string()))
            .select(PreviewRow::as_select())
            .first(&mut *self.conn.borrow_mut())
            .optional()?;

        row.map(Preview::try_from).transpose()
    }

    fn update_by(&self, internal_id: SepulkaId, touch: &Touch) -> RepoResult<()> {
        let next_revision = touch.next_revision()?;

        let target = sepulkas::table
            .filter(sepulkas::internal_id.eq(internal_id.to_string()))
            .filter(sepulkas::revision.eq(touch.revision));
        let changed = diesel::update(target)
            .set((
                sepulkas::revision.eq(sepulkas::revision + 1_i64),
                sepulkas::updated_at.eq(touch.updated_at),
            ))
            .execute(&mut *self.conn.borrow_mut())?;

        if changed == 0 {
            warn!(
                "event=sepulka_update module=repo status=error backend=orm error_code=contention internal_id={} observed_revision={}",
                internal_id, touch.revision
            );
            return Err(RepoError::Contention {
                internal_id,
                observed_revision: touch.revision,
            });
        }

        debug!(
            "event=sepulka_update module=repo status=ok backend=orm internal_id={} revision={}",
            internal_id, next_revision
        );
        Ok(())
    }
}

fn map_insert_error(err: DieselError) -> RepoError {
    if let DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) = &err {
        return RepoError::duplicate_key(info.message());
    }
    err.into()
}
