//! Sepulka domain model and wire-edge messages.
//!
//! # Responsibility
//! - Define the aggregate record and the projections derived from it.
//! - Define request/response shapes exchanged with the outer edge.
//!
//! # Invariants
//! - Every aggregate is identified by a stable, non-nil `SepulkaId`.
//! - Projections are never persisted on their own.
//! - `revision` and `updated_at` only ever advance together.

pub mod message;
pub mod sepulka;
