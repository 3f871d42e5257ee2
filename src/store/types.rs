//! Record and write-result types for the hook state store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clients::WebhookInfo;

/// The persisted webhook registration state of one subject.
///
/// `version` starts at 1 and increases by exactly one on every create,
/// update and failure marking. Mirrored remote fields written by the
/// reconciliation loop do not change it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookState {
    /// Unique subject (bot) identifier.
    pub subject_id: String,
    /// The webhook URL the subject should be registered with.
    pub webhook_url: String,
    /// Secret token the provider echoes on every callback.
    pub secret_token: String,
    /// Whether the last registration attempt failed.
    pub failed: bool,
    /// When the failure was detected.
    pub failure_detected_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version.
    pub version: u64,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated.
    pub updated_at: DateTime<Utc>,
    /// When the provider call that produced this state was issued.
    pub api_call_at: Option<DateTime<Utc>>,
    /// When the provider answered that call.
    pub api_resp_at: Option<DateTime<Utc>>,
    /// When the timing-ordered write was applied.
    pub db_update_at: Option<DateTime<Utc>>,
    /// The URL sent with that call.
    pub last_webhook_url: Option<String>,
    /// Last registration observed at the provider.
    pub remote: Option<RemoteMirror>,
    /// When `remote` was last written.
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl HookState {
    pub(crate) fn new(
        subject_id: &str,
        payload: &HookPayload,
        timing: Option<&CallTiming>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut state = Self {
            subject_id: subject_id.to_string(),
            webhook_url: payload.webhook_url.clone(),
            secret_token: payload.secret_token.clone(),
            failed: false,
            failure_detected_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
            api_call_at: None,
            api_resp_at: None,
            db_update_at: None,
            last_webhook_url: None,
            remote: None,
            reconciled_at: None,
        };
        if let Some(timing) = timing {
            state.apply_timing(timing, now);
        }
        state
    }

    pub(crate) fn apply_timing(&mut self, timing: &CallTiming, now: DateTime<Utc>) {
        self.api_call_at = Some(timing.api_call_at);
        self.api_resp_at = timing.api_resp_at;
        self.last_webhook_url = timing.last_webhook_url.clone();
        self.db_update_at = Some(now);
    }
}

/// The caller-supplied part of a hook state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookPayload {
    /// Webhook URL to register.
    pub webhook_url: String,
    /// Secret token to register.
    pub secret_token: String,
}

impl HookPayload {
    /// Creates a payload.
    #[must_use]
    pub fn new(webhook_url: impl Into<String>, secret_token: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            secret_token: secret_token.into(),
        }
    }
}

/// Timing of the provider call a write is derived from.
///
/// `api_call_at` orders competing timing-anchored writes: a write only lands
/// if the stored call is strictly older.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTiming {
    /// When the provider call was issued.
    pub api_call_at: DateTime<Utc>,
    /// When the provider answered.
    pub api_resp_at: Option<DateTime<Utc>>,
    /// URL sent with the call.
    pub last_webhook_url: Option<String>,
}

impl CallTiming {
    /// Creates a timing record for a call issued at `api_call_at`.
    #[must_use]
    pub const fn issued_at(api_call_at: DateTime<Utc>) -> Self {
        Self {
            api_call_at,
            api_resp_at: None,
            last_webhook_url: None,
        }
    }

    /// Sets the response time.
    #[must_use]
    pub const fn answered_at(mut self, api_resp_at: DateTime<Utc>) -> Self {
        self.api_resp_at = Some(api_resp_at);
        self
    }

    /// Sets the URL that was sent.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.last_webhook_url = Some(url.into());
        self
    }
}

/// Provider-side registration fields mirrored into the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMirror {
    /// URL registered at the provider (empty when none).
    pub url: String,
    /// Whether a custom certificate was uploaded.
    pub has_custom_certificate: bool,
    /// Updates waiting for delivery.
    pub pending_update_count: u64,
    /// Maximum simultaneous connections.
    pub max_connections: Option<u32>,
    /// IP address the provider resolved for the URL.
    pub ip_address: Option<String>,
    /// Update types the provider delivers.
    pub allowed_updates: Option<Vec<String>>,
}

impl From<&WebhookInfo> for RemoteMirror {
    fn from(info: &WebhookInfo) -> Self {
        Self {
            url: info.url.clone(),
            has_custom_certificate: info.has_custom_certificate,
            pending_update_count: info.pending_update_count,
            max_connections: info.max_connections,
            ip_address: info.ip_address.clone(),
            allowed_updates: info.allowed_updates.clone(),
        }
    }
}

/// Why a conditional write did not apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictReason {
    /// The stored version no longer matches the cached one.
    VersionMismatch,
    /// The stored state comes from a provider call issued at the same time
    /// or later.
    NewerApiCallExists,
}

impl ConflictReason {
    /// Returns the stable string form of the reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VersionMismatch => "version_mismatch",
            Self::NewerApiCallExists => "newer_api_call_exists",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a store write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write landed; the record is now at `version`.
    Applied {
        /// Version after the write.
        version: u64,
    },
    /// Nothing needed writing.
    Unchanged,
    /// A conditional write matched no record.
    Conflict(ConflictReason),
}

impl WriteOutcome {
    /// Returns `true` unless the write conflicted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !self.is_conflict()
    }

    /// Returns `true` if the write conflicted.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns the conflict reason, if any.
    #[must_use]
    pub const fn conflict_reason(&self) -> Option<ConflictReason> {
        match self {
            Self::Conflict(reason) => Some(*reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_state_starts_at_version_one() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let state = HookState::new("7", &HookPayload::new("https://h/7", "s"), None, now);

        assert_eq!(state.version, 1);
        assert!(!state.failed);
        assert_eq!(state.created_at, now);
        assert!(state.api_call_at.is_none());
    }

    #[test]
    fn test_new_state_records_timing() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let call = Utc.with_ymd_and_hms(2024, 5, 1, 11, 59, 58).unwrap();
        let timing = CallTiming::issued_at(call).with_url("https://h/7");
        let state = HookState::new("7", &HookPayload::new("https://h/7", "s"), Some(&timing), now);

        assert_eq!(state.api_call_at, Some(call));
        assert_eq!(state.db_update_at, Some(now));
        assert_eq!(state.last_webhook_url.as_deref(), Some("https://h/7"));
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let state = HookState::new("7", &HookPayload::new("https://h/7", "s"), None, now);
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["subjectId"], "7");
        assert_eq!(json["webhookUrl"], "https://h/7");
        assert_eq!(json["version"], 1);
    }

    #[test]
    fn test_conflict_reason_strings() {
        assert_eq!(
            ConflictReason::NewerApiCallExists.to_string(),
            "newer_api_call_exists"
        );
        assert_eq!(ConflictReason::VersionMismatch.as_str(), "version_mismatch");
    }

    #[test]
    fn test_write_outcome_flags() {
        let conflict = WriteOutcome::Conflict(ConflictReason::NewerApiCallExists);
        assert!(!conflict.is_success());
        assert!(conflict.is_conflict());
        assert_eq!(
            conflict.conflict_reason(),
            Some(ConflictReason::NewerApiCallExists)
        );
        assert!(WriteOutcome::Unchanged.is_success());
        assert!(WriteOutcome::Applied { version: 2 }.is_success());
    }
}
