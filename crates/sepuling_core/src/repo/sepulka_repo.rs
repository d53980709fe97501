//! Sepulka storage contract shared by every backend.
//!
//! # Responsibility
//! - Define the four persistence operations the domain depends on.
//! - Define the error taxonomy callers match on.
//!
//! # Invariants
//! - Finders report a miss as `Ok(None)`, never as an error.
//! - `update_by` is one atomic compare-and-increment; a stale revision or a
//!   missing row both surface as `Contention`.
//! - Infrastructure errors are propagated unmodified.

use crate::db::DbError;
use crate::model::sepulka::{Existence, Preview, Sepulka, SepulkaId, SepulkaValidationError, Touch};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Table backing the aggregate in both backends.
pub const SEPULKAS_TABLE: &str = "sepulkas";

static UNIQUE_FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"UNIQUE constraint failed: (?:\w+\.)?(\w+)")
        .expect("unique constraint pattern is valid")
});

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for sepulka persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(SepulkaValidationError),
    Db(DbError),
    /// Insert hit the primary key or the `external_id` unique index.
    DuplicateKey { column: Option<String> },
    /// Conditional update matched zero rows.
    Contention {
        internal_id: SepulkaId,
        observed_revision: i64,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::DuplicateKey { column: Some(column) } => {
                write!(f, "duplicate sepulka key: {column}")
            }
            Self::DuplicateKey { column: None } => write!(f, "duplicate sepulka key"),
            Self::Contention {
                internal_id,
                observed_revision,
            } => write!(
                f,
                "sepulka {internal_id} is not at revision {observed_revision}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted sepulka data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::DuplicateKey { .. } | Self::Contention { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<SepulkaValidationError> for RepoError {
    fn from(value: SepulkaValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<diesel::result::Error> for RepoError {
    fn from(value: diesel::result::Error) -> Self {
        Self::Db(DbError::Diesel(value))
    }
}

impl RepoError {
    /// Builds `DuplicateKey` from a driver message such as
    /// `UNIQUE constraint failed: sepulkas.external_id`.
    pub fn duplicate_key(message: &str) -> Self {
        let column = UNIQUE_FAILURE
            .captures(message)
            .and_then(|captures| captures.get(1))
            .map(|column| column.as_str().to_string());
        Self::DuplicateKey { column }
    }

    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

/// Storage port for sepulka aggregates.
pub trait SepulkaRepository {
    /// Persists a new aggregate and returns it unchanged.
    fn add(&self, sepulka: &Sepulka) -> RepoResult<Sepulka>;
    /// Looks up the existence projection by business key.
    fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<Existence>>;
    /// Looks up the preview projection by primary key.
    fn find_by_internal_id(&self, internal_id: SepulkaId) -> RepoResult<Option<Preview>>;
    /// Advances revision by one and replaces `updated_at`, but only when the
    /// stored revision equals `touch.revision`.
    fn update_by(&self, internal_id: SepulkaId, touch: &Touch) -> RepoResult<()>;
}

impl<R: SepulkaRepository + ?Sized> SepulkaRepository for Box<R> {
    fn add(&self, sepulka: &Sepulka) -> RepoResult<Sepulka> {
        (**self).add(sepulka)
    }

    fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<Existence>> {
        (**self).find_by_external_id(external_id)
    }

    fn find_by_internal_id(&self, internal_id: SepulkaId) -> RepoResult<Option<Preview>> {
        (**self).find_by_internal_id(internal_id)
    }

    fn update_by(&self, internal_id: SepulkaId, touch: &Touch) -> RepoResult<()> {
        (**self).update_by(internal_id, touch)
    }
}

/// Parses an `internal_id` column value read back from storage.
pub(crate) fn parse_internal_id(value: &str) -> RepoResult<SepulkaId> {
    let id = Uuid::parse_str(value).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{value}` in {SEPULKAS_TABLE}.internal_id"
        ))
    })?;
    if id.is_nil() {
        return Err(RepoError::InvalidData(format!(
            "nil uuid in {SEPULKAS_TABLE}.internal_id"
        )));
    }
    Ok(id)
}
