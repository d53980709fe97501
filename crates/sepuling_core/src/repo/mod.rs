//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage port the service layer depends on.
//! - Provide the SQL and diesel implementations of that port.
//! - Pick one implementation from configuration at startup.
//!
//! # Invariants
//! - Both backends satisfy the same contract; callers never branch on which
//!   one is active.

pub mod diesel_repo;
pub mod sepulka_repo;
pub mod sqlite_repo;

use crate::config::{StorageBackend, StorageConfig};
use diesel_repo::DieselSepulkaRepository;
use log::{error, info};
use sepulka_repo::{RepoResult, SepulkaRepository};
use sqlite_repo::SqliteSepulkaRepository;

/// Opens the storage backend named by `config`.
///
/// # Side effects
/// - Opens and migrates the configured database.
/// - Emits `repo_open` logging events.
pub fn open_repository(config: &StorageConfig) -> RepoResult<Box<dyn SepulkaRepository>> {
    let backend = config.backend.as_str();
    let opened: RepoResult<Box<dyn SepulkaRepository>> = match config.backend {
        StorageBackend::Sql if config.is_in_memory() => {
            SqliteSepulkaRepository::open_in_memory().map(boxed)
        }
        StorageBackend::Sql => SqliteSepulkaRepository::open(&config.database).map(boxed),
        StorageBackend::Orm => DieselSepulkaRepository::open(&config.database).map(boxed),
    };

    match &opened {
        Ok(_) => info!(
            "event=repo_open module=repo status=ok backend={} in_memory={}",
            backend,
            config.is_in_memory()
        ),
        Err(err) => error!(
            "event=repo_open module=repo status=error backend={} error={}",
            backend, err
        ),
    }
    opened
}

fn boxed<R: SepulkaRepository + 'static>(repo: R) -> Box<dyn SepulkaRepository> {
    Box::new(repo)
}
