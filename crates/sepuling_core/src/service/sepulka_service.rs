//! Sepulka registration use-case service.
//!
//! # Responsibility
//! - Assign identity, revision and timestamps to new sepulkas.
//! - Delegate persistence to whichever repository was configured.
//!
//! # Invariants
//! - This service is the only place new `SepulkaId` values are minted.
//! - Repository errors (duplicate key, contention, I/O) pass through
//!   unchanged; nothing here retries.

use crate::model::message::RegistrationRequest;
use crate::model::sepulka::{Existence, Preview, Sepulka, SepulkaId, Touch};
use crate::repo::sepulka_repo::{RepoResult, SepulkaRepository};
use log::{error, info, warn};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" in Unix epoch milliseconds.
pub type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Returns wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Use-case service over a sepulka repository.
pub struct SepulkaService<R: SepulkaRepository> {
    repo: R,
    clock: Clock,
}

impl<R: SepulkaRepository> SepulkaService<R> {
    /// Creates a service that timestamps with the system clock.
    pub fn new(repo: R) -> Self {
        Self::with_clock(repo, Box::new(now_epoch_ms))
    }

    /// Creates a service with a caller-provided clock.
    pub fn with_clock(repo: R, clock: Clock) -> Self {
        Self { repo, clock }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Registers a new sepulka.
    ///
    /// # Contract
    /// - Fresh v4 `internal_id`, `revision = 0`, `created_at == updated_at`.
    /// - `DuplicateKey` from the repository is returned as-is.
    pub fn register(&self, request: &RegistrationRequest) -> RepoResult<Sepulka> {
        let now = (self.clock)();
        let sepulka = Sepulka::register(request.external_id.as_str(), now)?;

        match self.repo.add(&sepulka) {
            Ok(saved) => {
                info!(
                    "event=sepulka_register module=service status=ok internal_id={}",
                    saved.internal_id
                );
                Ok(saved)
            }
            Err(err) => {
                if err.is_duplicate_key() {
                    warn!(
                        "event=sepulka_register module=service status=error error_code=duplicate_key"
                    );
                } else {
                    error!(
                        "event=sepulka_register module=service status=error error_code=repo_error error={}",
                        err
                    );
                }
                Err(err)
            }
        }
    }

    /// Looks up whether an external id is registered.
    pub fn exists(&self, external_id: &str) -> RepoResult<Option<Existence>> {
        self.repo.find_by_external_id(external_id)
    }

    /// Gets the preview of one sepulka.
    pub fn preview(&self, internal_id: SepulkaId) -> RepoResult<Option<Preview>> {
        self.repo.find_by_internal_id(internal_id)
    }

    /// Advances a sepulka past `observed_revision`, stamping the clock time.
    ///
    /// Returns the post-update state: `revision = observed_revision + 1`.
    /// An observed revision of `i64::MAX` fails validation before storage.
    /// A stale revision or unknown id fails with `Contention`; callers re-read
    /// and resubmit if they want to retry.
    pub fn touch(&self, internal_id: SepulkaId, observed_revision: i64) -> RepoResult<Touch> {
        let touch = Touch::new(observed_revision, (self.clock)())?;
        let next_revision = touch.next_revision()?;

        match self.repo.update_by(internal_id, &touch) {
            Ok(()) => {
                info!(
                    "event=sepulka_touch module=service status=ok internal_id={} revision={}",
                    internal_id, next_revision
                );
                Ok(Touch {
                    revision: next_revision,
                    updated_at: touch.updated_at,
                })
            }
            Err(err) => {
                if !err.is_contention() {
                    error!(
                        "event=sepulka_touch module=service status=error error_code=repo_error error={}",
                        err
                    );
                }
                Err(err)
            }
        }
    }
}
