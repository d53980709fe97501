//! Sepulka aggregate and projections.
//!
//! # Responsibility
//! - Define the canonical aggregate record persisted in `sepulkas`.
//! - Define the narrow projections used at each boundary.
//!
//! # Invariants
//! - `internal_id` is never nil and never reused.
//! - `external_id` is non-blank.
//! - `revision >= 0`.
//! - A touch never observes `i64::MAX`; that revision is terminal.
//! - `updated_at >= created_at`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier assigned to every sepulka at registration.
pub type SepulkaId = Uuid;

/// Invariant violations detected while building model values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SepulkaValidationError {
    NilInternalId,
    BlankExternalId,
    NegativeRevision(i64),
    RevisionExhausted,
    UpdatedBeforeCreated { created_at: i64, updated_at: i64 },
}

impl Display for SepulkaValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilInternalId => write!(f, "internal_id must not be nil"),
            Self::BlankExternalId => write!(f, "external_id must not be blank"),
            Self::NegativeRevision(revision) => {
                write!(f, "revision ({revision}) must be >= 0")
            }
            Self::RevisionExhausted => {
                write!(f, "revision {} cannot be advanced", i64::MAX)
            }
            Self::UpdatedBeforeCreated {
                created_at,
                updated_at,
            } => write!(
                f,
                "updated_at ({updated_at}) must be >= created_at ({created_at})"
            ),
        }
    }
}

impl Error for SepulkaValidationError {}

/// Canonical aggregate record.
///
/// Fields are public for reading, but every constructor and the serde
/// decoding path run [`Sepulka::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SepulkaFields")]
pub struct Sepulka {
    /// Primary key, generated once at registration.
    pub internal_id: SepulkaId,
    /// Caller supplied business key, unique across all sepulkas.
    pub external_id: String,
    /// Optimistic concurrency token, starts at 0.
    pub revision: i64,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. Replaced on every successful update.
    pub updated_at: i64,
}

#[derive(Deserialize)]
struct SepulkaFields {
    internal_id: SepulkaId,
    external_id: String,
    revision: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SepulkaFields> for Sepulka {
    type Error = SepulkaValidationError;

    fn try_from(value: SepulkaFields) -> Result<Self, Self::Error> {
        Sepulka::new(
            value.internal_id,
            value.external_id,
            value.revision,
            value.created_at,
            value.updated_at,
        )
    }
}

impl Sepulka {
    /// Builds an aggregate from already known field values.
    ///
    /// Used by storage decoding and by tests that need fixed identities.
    pub fn new(
        internal_id: SepulkaId,
        external_id: impl Into<String>,
        revision: i64,
        created_at: i64,
        updated_at: i64,
    ) -> Result<Self, SepulkaValidationError> {
        let sepulka = Self {
            internal_id,
            external_id: external_id.into(),
            revision,
            created_at,
            updated_at,
        };
        sepulka.validate()?;
        Ok(sepulka)
    }

    /// Builds a freshly registered aggregate.
    ///
    /// # Invariants
    /// - A new v4 id is generated.
    /// - `revision` starts at 0.
    /// - `created_at == updated_at == now`.
    pub fn register(
        external_id: impl Into<String>,
        now: i64,
    ) -> Result<Self, SepulkaValidationError> {
        Self::new(Uuid::new_v4(), external_id, 0, now, now)
    }

    /// Checks all aggregate invariants.
    pub fn validate(&self) -> Result<(), SepulkaValidationError> {
        if self.internal_id.is_nil() {
            return Err(SepulkaValidationError::NilInternalId);
        }
        if self.external_id.trim().is_empty() {
            return Err(SepulkaValidationError::BlankExternalId);
        }
        if self.revision < 0 {
            return Err(SepulkaValidationError::NegativeRevision(self.revision));
        }
        if self.updated_at < self.created_at {
            return Err(SepulkaValidationError::UpdatedBeforeCreated {
                created_at: self.created_at,
                updated_at: self.updated_at,
            });
        }
        Ok(())
    }

    /// Returns the touch a caller would submit after observing this state.
    pub fn touch(&self, updated_at: i64) -> Touch {
        Touch {
            revision: self.revision,
            updated_at,
        }
    }
}

/// Answers whether a sepulka with an external id exists, and under which id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Existence {
    pub internal_id: SepulkaId,
    pub external_id: String,
}

impl From<&Sepulka> for Existence {
    fn from(value: &Sepulka) -> Self {
        Self {
            internal_id: value.internal_id,
            external_id: value.external_id.clone(),
        }
    }
}

/// Read-only summary. Never carries the revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    pub internal_id: SepulkaId,
    pub external_id: String,
    pub created_at: i64,
}

impl From<&Sepulka> for Preview {
    fn from(value: &Sepulka) -> Self {
        Self {
            internal_id: value.internal_id,
            external_id: value.external_id.clone(),
            created_at: value.created_at,
        }
    }
}

/// Conditional update payload.
///
/// `revision` is the revision the caller last observed, not the one it
/// expects to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Touch {
    pub revision: i64,
    pub updated_at: i64,
}

impl Touch {
    pub fn new(revision: i64, updated_at: i64) -> Result<Self, SepulkaValidationError> {
        let touch = Self {
            revision,
            updated_at,
        };
        touch.validate()?;
        Ok(touch)
    }

    pub fn validate(&self) -> Result<(), SepulkaValidationError> {
        if self.revision < 0 {
            return Err(SepulkaValidationError::NegativeRevision(self.revision));
        }
        if self.revision == i64::MAX {
            return Err(SepulkaValidationError::RevisionExhausted);
        }
        Ok(())
    }

    /// Validates the touch and returns the revision a successful update stores.
    pub fn next_revision(&self) -> Result<i64, SepulkaValidationError> {
        self.validate()?;
        self.revision
            .checked_add(1)
            .ok_or(SepulkaValidationError::RevisionExhausted)
    }
}
