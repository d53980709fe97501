//! Core domain logic for Sepuling.
//! This crate owns sepulka identity, revisions and storage.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, StorageBackend, StorageConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::message::{RegistrationRequest, RegistrationResponse};
pub use model::sepulka::{Existence, Preview, Sepulka, SepulkaId, SepulkaValidationError, Touch};
pub use repo::diesel_repo::DieselSepulkaRepository;
pub use repo::open_repository;
pub use repo::sepulka_repo::{RepoError, RepoResult, SepulkaRepository};
pub use repo::sqlite_repo::SqliteSepulkaRepository;
pub use service::sepulka_service::{now_epoch_ms, Clock, SepulkaService};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
