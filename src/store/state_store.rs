//! Versioned hook state store with two conditional write paths.
//!
//! - **Version CAS** ([`update`](HookStateStore::update),
//!   [`set_failed`](HookStateStore::set_failed)) for purely local mutations.
//!   The expected version comes from the injected [`VersionCache`].
//! - **Timing order** ([`update_with_timing`](HookStateStore::update_with_timing)
//!   and friends) for writes derived from a provider call, ordered by the
//!   call's issue time instead of the version.
//!
//! # Consistency
//!
//! The version cache is a fast path: a conditional write is always checked
//! against the stored version, so storage never loses an update, but a write
//! from another process is only noticed when the conditional write misses.
//! The cached version is updated after the backend confirms a write, never
//! before.

use std::sync::Arc;

use chrono::Utc;

use super::backend::{HookFilter, HookPatch, HookStateBackend};
use super::errors::StoreError;
use super::types::{CallTiming, ConflictReason, HookPayload, HookState, RemoteMirror, WriteOutcome};
use crate::cache::SwrCache;

/// Cache of the last known version per subject (`None` = unknown subject).
pub type VersionCache = SwrCache<String, Option<u64>, StoreError>;

/// Creates a version cache that reads versions from `backend`.
#[must_use]
pub fn version_cache(backend: Arc<dyn HookStateBackend>) -> VersionCache {
    SwrCache::new(move |subject_id: String| {
        let backend = Arc::clone(&backend);
        async move {
            let state = backend.find(&subject_id).await?;
            Ok(state.map(|state| state.version))
        }
    })
}

/// The sole owner of hook state records.
///
/// # Example
///
/// ```rust
/// use hook_sync::store::{HookPayload, HookStateStore, MemoryBackend};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let store = HookStateStore::with_backend(Arc::new(MemoryBackend::new()));
///
/// let created = store.create("42", HookPayload::new("https://gw/42", "s")).await.unwrap();
/// assert_eq!(created.version, 1);
///
/// let outcome = store.update("42", HookPayload::new("https://gw/42b", "s")).await.unwrap();
/// assert!(outcome.is_success());
/// # });
/// ```
pub struct HookStateStore {
    backend: Arc<dyn HookStateBackend>,
    versions: Arc<VersionCache>,
}

impl HookStateStore {
    /// Creates a store over `backend` using the given version cache.
    ///
    /// The cache is shared state: handing the same cache to several stores
    /// makes them trust each other's cached versions.
    #[must_use]
    pub fn new(backend: Arc<dyn HookStateBackend>, versions: Arc<VersionCache>) -> Self {
        Self { backend, versions }
    }

    /// Creates a store with a private version cache reading from `backend`.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn HookStateBackend>) -> Self {
        let versions = Arc::new(version_cache(Arc::clone(&backend)));
        Self::new(backend, versions)
    }

    /// Returns the version cache used by this store.
    #[must_use]
    pub fn versions(&self) -> &VersionCache {
        &self.versions
    }

    /// Inserts a new record at version 1.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateSubject`] if the subject exists, or a
    /// backend error.
    pub async fn create(
        &self,
        subject_id: &str,
        payload: HookPayload,
    ) -> Result<HookState, StoreError> {
        self.insert(HookState::new(subject_id, &payload, None, Utc::now()))
            .await
    }

    /// Returns the subject's current record.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub async fn get(&self, subject_id: &str) -> Result<Option<HookState>, StoreError> {
        self.backend.find(subject_id).await
    }

    /// Replaces the payload if the stored version still equals the cached
    /// one, clearing `failed` and bumping the version.
    ///
    /// An unknown subject is created instead. A creation race lost to
    /// another writer is retried once as a conditional update.
    ///
    /// # Errors
    ///
    /// Returns a backend error. A version mismatch is reported as
    /// [`WriteOutcome::Conflict`].
    pub async fn update(
        &self,
        subject_id: &str,
        payload: HookPayload,
    ) -> Result<WriteOutcome, StoreError> {
        let cached = self.versions.get(subject_id.to_string()).await?;

        let version = match cached {
            Some(version) => version,
            None => match self.create(subject_id, payload.clone()).await {
                Ok(created) => {
                    return Ok(WriteOutcome::Applied {
                        version: created.version,
                    })
                }
                Err(StoreError::DuplicateSubject { .. }) => {
                    tracing::debug!(subject = subject_id, "lost creation race, retrying as update");
                    match self.refresh_version(subject_id).await? {
                        Some(version) => version,
                        None => return Ok(WriteOutcome::Conflict(ConflictReason::VersionMismatch)),
                    }
                }
                Err(error) => return Err(error),
            },
        };

        let patch = HookPatch::Payload {
            payload,
            timing: None,
        };
        self.write_versioned(subject_id, version, patch).await
    }

    /// Marks the subject failed if the stored version still equals the
    /// cached one, bumping the version.
    ///
    /// Unknown subjects are left alone and reported as
    /// [`WriteOutcome::Unchanged`].
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub async fn set_failed(&self, subject_id: &str) -> Result<WriteOutcome, StoreError> {
        match self.versions.get(subject_id.to_string()).await? {
            Some(version) => {
                self.write_versioned(subject_id, version, HookPatch::Failed)
                    .await
            }
            None => Ok(WriteOutcome::Unchanged),
        }
    }

    /// Inserts a new record at version 1 carrying provider call timing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateSubject`] if the subject exists, or a
    /// backend error.
    pub async fn create_with_timing(
        &self,
        subject_id: &str,
        payload: HookPayload,
        timing: CallTiming,
    ) -> Result<HookState, StoreError> {
        self.insert(HookState::new(subject_id, &payload, Some(&timing), Utc::now()))
            .await
    }

    /// Writes a provider-derived payload if no newer provider call has been
    /// recorded for the subject.
    ///
    /// With `has_changes == false` nothing is written. A missing subject is
    /// created; if another writer creates it first, the write is retried as
    /// a timing-ordered update. When the stored `api_call_at` is the same or
    /// newer, the result is
    /// `WriteOutcome::Conflict(ConflictReason::NewerApiCallExists)`.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub async fn update_with_timing(
        &self,
        subject_id: &str,
        payload: HookPayload,
        timing: CallTiming,
        has_changes: bool,
    ) -> Result<WriteOutcome, StoreError> {
        if !has_changes {
            return Ok(WriteOutcome::Unchanged);
        }

        if self.backend.find(subject_id).await?.is_none() {
            match self
                .create_with_timing(subject_id, payload.clone(), timing.clone())
                .await
            {
                Ok(created) => {
                    return Ok(WriteOutcome::Applied {
                        version: created.version,
                    })
                }
                Err(StoreError::DuplicateSubject { .. }) => {
                    tracing::debug!(
                        subject = subject_id,
                        "subject created concurrently, retrying as timed update"
                    );
                }
                Err(error) => return Err(error),
            }
        }

        let filter = HookFilter::subject(subject_id).with_api_call_before(timing.api_call_at);
        let patch = HookPatch::Payload {
            payload,
            timing: Some(timing),
        };

        match self.backend.update_where(filter, patch).await? {
            Some(updated) => Ok(self.applied(&updated)),
            None => {
                tracing::warn!(
                    subject = subject_id,
                    reason = ConflictReason::NewerApiCallExists.as_str(),
                    "timed update rejected"
                );
                Ok(WriteOutcome::Conflict(ConflictReason::NewerApiCallExists))
            }
        }
    }

    /// Writes a provider-derived payload without any ordering check.
    ///
    /// For callers that already established their call is the newest.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the subject does not exist, or a
    /// backend error.
    pub async fn force_update_with_timing(
        &self,
        subject_id: &str,
        payload: HookPayload,
        timing: CallTiming,
    ) -> Result<WriteOutcome, StoreError> {
        let patch = HookPatch::Payload {
            payload,
            timing: Some(timing),
        };
        match self
            .backend
            .update_where(HookFilter::subject(subject_id), patch)
            .await?
        {
            Some(updated) => Ok(self.applied(&updated)),
            None => Err(StoreError::NotFound {
                subject: subject_id.to_string(),
            }),
        }
    }

    /// Overwrites the mirrored provider fields of a subject.
    ///
    /// Last write wins; the version is not checked or changed. Returns
    /// `false` if the subject does not exist.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub async fn apply_remote(
        &self,
        subject_id: &str,
        mirror: RemoteMirror,
    ) -> Result<bool, StoreError> {
        let updated = self
            .backend
            .update_where(HookFilter::subject(subject_id), HookPatch::Remote(mirror))
            .await?;
        Ok(updated.is_some())
    }

    /// Returns every record not marked failed.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub async fn list_active(&self) -> Result<Vec<HookState>, StoreError> {
        self.backend.list_active().await
    }

    /// Removes the subject's record and forgets its cached version.
    ///
    /// # Errors
    ///
    /// Returns a backend error.
    pub async fn delete(&self, subject_id: &str) -> Result<bool, StoreError> {
        let removed = self.backend.remove(subject_id).await?;
        self.versions.delete(&subject_id.to_string());
        Ok(removed)
    }

    async fn insert(&self, state: HookState) -> Result<HookState, StoreError> {
        self.backend.insert(state.clone()).await?;
        self.versions.set(Some(state.version), state.subject_id.clone());
        Ok(state)
    }

    async fn write_versioned(
        &self,
        subject_id: &str,
        version: u64,
        patch: HookPatch,
    ) -> Result<WriteOutcome, StoreError> {
        let filter = HookFilter::subject(subject_id).with_version(version);
        match self.backend.update_where(filter, patch).await? {
            Some(updated) => Ok(self.applied(&updated)),
            None => {
                tracing::warn!(
                    subject = subject_id,
                    expected_version = version,
                    "version conflict on conditional write"
                );
                self.versions.delete(&subject_id.to_string());
                Ok(WriteOutcome::Conflict(ConflictReason::VersionMismatch))
            }
        }
    }

    /// Re-reads the stored version, bypassing the cached one.
    async fn refresh_version(&self, subject_id: &str) -> Result<Option<u64>, StoreError> {
        let key = subject_id.to_string();
        self.versions.delete(&key);
        self.versions.get(key).await
    }

    fn applied(&self, updated: &HookState) -> WriteOutcome {
        self.versions
            .set(Some(updated.version), updated.subject_id.clone());
        WriteOutcome::Applied {
            version: updated.version,
        }
    }
}

impl std::fmt::Debug for HookStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookStateStore")
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}
