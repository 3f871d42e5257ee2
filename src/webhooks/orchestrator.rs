//! Keeps a subject's provider registration and its hook state in step.
//!
//! [`WebhookSync::ensure_webhook`] registers the webhook at the provider and
//! then decides, from the provider's answer, whether the store needs a write:
//!
//! 1. No answer or `ok: false`: mark the subject failed.
//! 2. Answer reports no change: leave the store alone.
//! 3. Answer reports a change: write through the timing-ordered path.
//! 4. Timing conflict: re-read, and force the write if this call is still the
//!    newest; otherwise the other writer's state stays.
//! 5. Any other store failure is logged. The registration already happened
//!    at the provider, so the result is still reported.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::tokens::TokenRegistry;
use super::verification::derive_secret_token;
use crate::clients::{RegistrationClient, RegistrationResult, SetWebhookParams};
use crate::config::{BotToken, SigningKey, SyncConfig};
use crate::store::{CallTiming, ConflictReason, HookPayload, HookStateStore, StoreError, WriteOutcome};

/// What [`WebhookSync::ensure_webhook`] did with the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncAction {
    /// Registration failed; the subject was marked failed if it was known.
    MarkedFailed {
        /// Whether a stored record was actually marked.
        marked: bool,
    },
    /// The provider reported no change; the store was not touched.
    Unchanged,
    /// The new state was written.
    Persisted {
        /// Version after the write.
        version: u64,
    },
    /// A timing conflict turned out stale and the write was forced.
    ForcePersisted {
        /// Version after the write.
        version: u64,
    },
    /// A newer provider call already owns the stored state.
    LostRace,
    /// The store failed; the registration stands at the provider.
    PersistFailed,
}

/// Result of one [`WebhookSync::ensure_webhook`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnsureReport {
    /// The subject (bot id) the call was for.
    pub subject_id: String,
    /// The provider's answer; `None` when retries were exhausted.
    pub registration: Option<RegistrationResult>,
    /// What happened in the store.
    pub action: SyncAction,
}

impl EnsureReport {
    /// Returns `true` if the provider accepted the registration.
    ///
    /// Store outcomes do not affect this.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.registration.as_ref().is_some_and(|result| result.ok)
    }
}

/// Sync orchestrator tying the registration client to the hook state store.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use hook_sync::clients::{RegistrationClient, SetWebhookParams};
/// use hook_sync::store::{HookStateStore, MemoryBackend};
/// use hook_sync::webhooks::{TokenRegistry, WebhookSync};
///
/// let client = Arc::new(RegistrationClient::new(&config)?);
/// let store = Arc::new(HookStateStore::with_backend(Arc::new(MemoryBackend::new())));
/// let sync = WebhookSync::new(&config, client, store, Arc::new(TokenRegistry::new()));
///
/// let report = sync
///     .ensure_webhook(&token, SetWebhookParams::new("https://gw.example.com/hook/42"))
///     .await;
/// assert!(report.is_success());
/// ```
#[derive(Debug)]
pub struct WebhookSync {
    client: Arc<RegistrationClient>,
    store: Arc<HookStateStore>,
    tokens: Arc<TokenRegistry>,
    signing_key: Option<SigningKey>,
}

impl WebhookSync {
    /// Creates an orchestrator over shared components.
    #[must_use]
    pub fn new(
        config: &SyncConfig,
        client: Arc<RegistrationClient>,
        store: Arc<HookStateStore>,
        tokens: Arc<TokenRegistry>,
    ) -> Self {
        Self {
            client,
            store,
            tokens,
            signing_key: config.secret_signing_key().cloned(),
        }
    }

    /// Returns the registration client.
    #[must_use]
    pub const fn client(&self) -> &Arc<RegistrationClient> {
        &self.client
    }

    /// Returns the hook state store.
    #[must_use]
    pub const fn store(&self) -> &Arc<HookStateStore> {
        &self.store
    }

    /// Returns the token registry.
    #[must_use]
    pub const fn tokens(&self) -> &Arc<TokenRegistry> {
        &self.tokens
    }

    /// Registers the webhook for `token` and records the result.
    ///
    /// Without a `secret_token` in `params`, one is derived from the
    /// configured signing key (if any). The token is recorded in the
    /// registry so the reconciliation loop can inspect the subject.
    pub async fn ensure_webhook(&self, token: &BotToken, params: SetWebhookParams) -> EnsureReport {
        let subject_id = token.bot_id().to_string();
        self.tokens.insert(token.clone()).await;

        let params = self.with_secret_token(&subject_id, params);
        let api_call_at = Utc::now();
        let registration = self.client.register(token, &params).await;
        let api_resp_at = Utc::now();

        let action = match &registration {
            Some(result) if result.ok => {
                if self.client.classify_change(result) {
                    let timing = CallTiming::issued_at(api_call_at)
                        .answered_at(api_resp_at)
                        .with_url(params.url.clone());
                    self.persist(&subject_id, &params, timing).await
                } else {
                    tracing::debug!(
                        subject = %subject_id,
                        description = %result.description,
                        "Webhook unchanged at provider, skipping store write"
                    );
                    SyncAction::Unchanged
                }
            }
            _ => self.mark_failed(&subject_id, registration.as_ref()).await,
        };

        EnsureReport {
            subject_id,
            registration,
            action,
        }
    }

    fn with_secret_token(&self, subject_id: &str, params: SetWebhookParams) -> SetWebhookParams {
        match (&params.secret_token, &self.signing_key) {
            (None, Some(key)) => {
                let secret = derive_secret_token(key, subject_id);
                params.secret_token(secret)
            }
            _ => params,
        }
    }

    async fn mark_failed(
        &self,
        subject_id: &str,
        registration: Option<&RegistrationResult>,
    ) -> SyncAction {
        match registration {
            Some(result) => tracing::warn!(
                subject = subject_id,
                error_code = ?result.error_code,
                description = %result.description,
                "Provider rejected webhook registration"
            ),
            None => tracing::warn!(
                subject = subject_id,
                "Provider unreachable, webhook registration failed"
            ),
        }

        match self.store.set_failed(subject_id).await {
            Ok(outcome) => SyncAction::MarkedFailed {
                marked: matches!(outcome, WriteOutcome::Applied { .. }),
            },
            Err(error) => {
                tracing::error!(
                    subject = subject_id,
                    error = %error,
                    "Failed to mark subject as failed"
                );
                SyncAction::PersistFailed
            }
        }
    }

    async fn persist(
        &self,
        subject_id: &str,
        params: &SetWebhookParams,
        timing: CallTiming,
    ) -> SyncAction {
        let payload = HookPayload::new(
            params.url.clone(),
            params.secret_token.clone().unwrap_or_default(),
        );
        let api_call_at = timing.api_call_at;

        let outcome = self
            .store
            .update_with_timing(subject_id, payload.clone(), timing.clone(), true)
            .await;

        match outcome {
            Ok(WriteOutcome::Applied { version }) => SyncAction::Persisted { version },
            Ok(WriteOutcome::Unchanged) => SyncAction::Unchanged,
            Ok(WriteOutcome::Conflict(ConflictReason::NewerApiCallExists)) => {
                self.resolve_conflict(subject_id, payload, timing, api_call_at)
                    .await
            }
            Ok(WriteOutcome::Conflict(reason)) => {
                tracing::warn!(subject = subject_id, reason = %reason, "Unexpected write conflict");
                SyncAction::LostRace
            }
            Err(error) => persist_failed(subject_id, &error),
        }
    }

    async fn resolve_conflict(
        &self,
        subject_id: &str,
        payload: HookPayload,
        timing: CallTiming,
        api_call_at: DateTime<Utc>,
    ) -> SyncAction {
        let stored = match self.store.get(subject_id).await {
            Ok(stored) => stored,
            Err(error) => return persist_failed(subject_id, &error),
        };

        let still_newest = stored
            .as_ref()
            .and_then(|state| state.api_call_at)
            .map_or(true, |stored_call| api_call_at > stored_call);

        if !still_newest {
            tracing::debug!(
                subject = subject_id,
                "Newer provider call already recorded, keeping stored state"
            );
            return SyncAction::LostRace;
        }

        match self
            .store
            .force_update_with_timing(subject_id, payload, timing)
            .await
        {
            Ok(WriteOutcome::Applied { version }) => SyncAction::ForcePersisted { version },
            Ok(_) => SyncAction::LostRace,
            Err(error) => persist_failed(subject_id, &error),
        }
    }
}

fn persist_failed(subject_id: &str, error: &StoreError) -> SyncAction {
    tracing::error!(
        subject = subject_id,
        error = %error,
        "Failed to persist webhook state after successful registration"
    );
    SyncAction::PersistFailed
}

// Verify WebhookSync is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<WebhookSync>();
};
