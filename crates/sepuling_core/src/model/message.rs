//! Request/response shapes for the registration edge.
//!
//! Transport binding lives outside this crate. These types only fix the
//! field names an edge adapter serializes.

use crate::model::sepulka::{Sepulka, SepulkaId};
use serde::{Deserialize, Serialize};

/// Input for `SepulkaService::register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub external_id: String,
}

impl RegistrationRequest {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
        }
    }
}

/// Output relayed back to the caller after a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub external_id: String,
    pub internal_id: SepulkaId,
    pub revision: i64,
    pub created_at: i64,
}

impl From<&Sepulka> for RegistrationResponse {
    fn from(value: &Sepulka) -> Self {
        Self {
            external_id: value.external_id.clone(),
            internal_id: value.internal_id,
            revision: value.revision,
            created_at: value.created_at,
        }
    }
}
