//! Storage seam for hook state records.
//!
//! [`HookStateBackend`] is the only way the store touches persisted records.
//! Every conditional write goes through [`HookStateBackend::update_where`],
//! which must apply filter and patch as one atomic operation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::errors::StoreError;
use super::types::{CallTiming, HookPayload, HookState, RemoteMirror};
use crate::BoxFuture;

/// Selects the record a conditional write applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookFilter {
    /// Subject the record belongs to.
    pub subject_id: String,
    /// Required stored version, if any.
    pub version: Option<u64>,
    /// The stored `api_call_at` must be absent or strictly older than this.
    pub api_call_before: Option<DateTime<Utc>>,
}

impl HookFilter {
    /// Matches the subject's record regardless of its state.
    #[must_use]
    pub fn subject(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            version: None,
            api_call_before: None,
        }
    }

    /// Additionally requires the stored version to equal `version`.
    #[must_use]
    pub const fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Additionally requires the stored call to be older than `api_call_at`.
    #[must_use]
    pub const fn with_api_call_before(mut self, api_call_at: DateTime<Utc>) -> Self {
        self.api_call_before = Some(api_call_at);
        self
    }

    /// Returns `true` if `state` satisfies the filter.
    #[must_use]
    pub fn matches(&self, state: &HookState) -> bool {
        if state.subject_id != self.subject_id {
            return false;
        }
        if self.version.is_some_and(|version| state.version != version) {
            return false;
        }
        match (self.api_call_before, state.api_call_at) {
            (Some(before), Some(stored)) => stored < before,
            _ => true,
        }
    }
}

/// The mutation a conditional write applies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookPatch {
    /// Replace the payload, clear `failed`, bump `version`.
    Payload {
        /// New payload.
        payload: HookPayload,
        /// Timing of the provider call, for timing-anchored writes.
        timing: Option<CallTiming>,
    },
    /// Mark the record failed, bump `version`.
    Failed,
    /// Overwrite mirrored provider fields; `version` is untouched.
    Remote(RemoteMirror),
}

impl HookPatch {
    /// Applies the patch to `state` as of `now`.
    pub fn apply(&self, state: &mut HookState, now: DateTime<Utc>) {
        match self {
            Self::Payload { payload, timing } => {
                state.webhook_url.clone_from(&payload.webhook_url);
                state.secret_token.clone_from(&payload.secret_token);
                state.failed = false;
                if let Some(timing) = timing {
                    state.apply_timing(timing, now);
                }
                state.version += 1;
                state.updated_at = now;
            }
            Self::Failed => {
                state.failed = true;
                state.failure_detected_at = Some(now);
                state.version += 1;
                state.updated_at = now;
            }
            Self::Remote(mirror) => {
                state.remote = Some(mirror.clone());
                state.reconciled_at = Some(now);
            }
        }
    }
}

/// Persistence operations the hook state store relies on.
///
/// Implementations must enforce subject uniqueness in
/// [`insert`](Self::insert) and apply [`update_where`](Self::update_where)
/// atomically (one round trip, filter and patch together).
pub trait HookStateBackend: Send + Sync + 'static {
    /// Inserts a new record.
    ///
    /// Fails with [`StoreError::DuplicateSubject`] if the subject exists.
    fn insert(&self, state: HookState) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Returns the subject's record, if any.
    fn find<'a>(&'a self, subject_id: &'a str)
        -> BoxFuture<'a, Result<Option<HookState>, StoreError>>;

    /// Applies `patch` to the record matching `filter`.
    ///
    /// Returns the updated record, or `None` when nothing matched.
    fn update_where(
        &self,
        filter: HookFilter,
        patch: HookPatch,
    ) -> BoxFuture<'_, Result<Option<HookState>, StoreError>>;

    /// Removes the subject's record. Returns `true` if one existed.
    fn remove<'a>(&'a self, subject_id: &'a str) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Returns every record not marked failed.
    fn list_active(&self) -> BoxFuture<'_, Result<Vec<HookState>, StoreError>>;
}

/// In-process backend keeping records in a map.
///
/// Each operation holds the map lock for its whole duration, which makes
/// `update_where` atomic within the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, HookState>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

impl HookStateBackend for MemoryBackend {
    fn insert(&self, state: HookState) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            if records.contains_key(&state.subject_id) {
                return Err(StoreError::DuplicateSubject {
                    subject: state.subject_id,
                });
            }
            records.insert(state.subject_id.clone(), state);
            Ok(())
        })
    }

    fn find<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<HookState>, StoreError>> {
        Box::pin(async move { Ok(self.records.read().await.get(subject_id).cloned()) })
    }

    fn update_where(
        &self,
        filter: HookFilter,
        patch: HookPatch,
    ) -> BoxFuture<'_, Result<Option<HookState>, StoreError>> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            let Some(state) = records.get_mut(&filter.subject_id) else {
                return Ok(None);
            };
            if !filter.matches(state) {
                return Ok(None);
            }
            patch.apply(state, Utc::now());
            Ok(Some(state.clone()))
        })
    }

    fn remove<'a>(&'a self, subject_id: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move { Ok(self.records.write().await.remove(subject_id).is_some()) })
    }

    fn list_active(&self) -> BoxFuture<'_, Result<Vec<HookState>, StoreError>> {
        Box::pin(async move {
            let records = self.records.read().await;
            let mut active: Vec<HookState> =
                records.values().filter(|state| !state.failed).cloned().collect();
            active.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
            Ok(active)
        })
    }
}
