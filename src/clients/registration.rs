//! HTTP client for the provider's webhook registration API.
//!
//! This module provides [`RegistrationClient`], which registers, deletes and
//! inspects webhooks on behalf of a bot token. Registration calls retry on
//! rate limiting and transport failures; inspection does not retry.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::classify::ChangeClassifier;
use super::errors::ProviderError;
use super::retry::RetryPolicy;
use super::types::{ApiEnvelope, ProviderMethod, RegistrationResult, SetWebhookParams, WebhookInfo};
use crate::config::{BotToken, SyncConfig};

/// Crate version from Cargo.toml.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client for the provider's webhook methods.
///
/// The client handles:
/// - URL construction as `<base>/<prefix><token>/<method>`
/// - The `User-Agent` header, with the configured prefix
/// - Retries for rate limiting and transport failures
/// - Change classification of registration results
///
/// # Thread Safety
///
/// `RegistrationClient` is `Send + Sync` and cheap to share behind an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use hook_sync::{ApiBaseUrl, BotToken, SyncConfig};
/// use hook_sync::clients::{RegistrationClient, SetWebhookParams};
///
/// let config = SyncConfig::builder()
///     .api_base_url(ApiBaseUrl::new("https://api.telegram.org")?)
///     .build()?;
/// let client = RegistrationClient::new(&config)?;
///
/// let token = BotToken::new("123456:ABC-def")?;
/// let params = SetWebhookParams::new("https://gw.example.com/hook/123456");
///
/// if let Some(result) = client.register(&token, &params).await {
///     println!("changed: {}", client.classify_change(&result));
/// }
/// ```
#[derive(Debug)]
pub struct RegistrationClient {
    client: reqwest::Client,
    base_url: String,
    path_prefix: String,
    retry_policy: RetryPolicy,
    classifier: ChangeClassifier,
}

// Verify RegistrationClient is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<RegistrationClient>();
};

impl RegistrationClient {
    /// Creates a client from the shared configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] if the underlying HTTP client
    /// cannot be created (TLS initialization failure).
    pub fn new(config: &SyncConfig) -> Result<Self, ProviderError> {
        let user_agent_prefix = config
            .user_agent_prefix()
            .map_or(String::new(), |prefix| format!("{prefix} | "));
        let rust_version = env!("CARGO_PKG_RUST_VERSION");
        let user_agent = format!("{user_agent_prefix}hook-sync v{SDK_VERSION} | Rust {rust_version}");

        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url().as_ref().to_string(),
            path_prefix: config.path_prefix().to_string(),
            retry_policy: *config.retry_policy(),
            classifier: config.classifier().clone(),
        })
    }

    /// Returns the classifier applied by [`classify_change`](Self::classify_change).
    #[must_use]
    pub const fn classifier(&self) -> &ChangeClassifier {
        &self.classifier
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns `true` if `result` reports a provider-side change.
    #[must_use]
    pub fn classify_change(&self, result: &RegistrationResult) -> bool {
        self.classifier.classify_change(result)
    }

    /// Registers a webhook for `token`.
    ///
    /// Rate-limited calls wait for the provider's `retry_after` and transport
    /// failures back off by `attempt * base_delay`. Both share the
    /// `max_attempts` budget of the retry policy.
    ///
    /// Returns `None` when every attempt failed to produce a provider answer,
    /// and `Some` with `ok: false` for a well-formed rejection.
    pub async fn register(
        &self,
        token: &BotToken,
        params: &SetWebhookParams,
    ) -> Option<RegistrationResult> {
        self.call_with_retry(token, ProviderMethod::SetWebhook, params)
            .await
    }

    /// Removes the webhook registered for `token`.
    ///
    /// Retries like [`register`](Self::register).
    pub async fn delete_webhook(
        &self,
        token: &BotToken,
        drop_pending_updates: bool,
    ) -> Option<RegistrationResult> {
        let body = serde_json::json!({ "drop_pending_updates": drop_pending_updates });
        self.call_with_retry(token, ProviderMethod::DeleteWebhook, &body)
            .await
    }

    /// Fetches the provider's current registration for `token`.
    ///
    /// Single attempt. Failures are logged and reported as `None`.
    pub async fn query_info(&self, token: &BotToken) -> Option<WebhookInfo> {
        match self.fetch_info(token).await {
            Ok(info) => Some(info),
            Err(error) => {
                tracing::warn!(
                    subject = token.bot_id(),
                    error = %error,
                    "Failed to query webhook info"
                );
                None
            }
        }
    }

    /// Fetches the provider's current registration for `token`.
    ///
    /// # Errors
    ///
    /// Returns the [`ProviderError`] of the single attempt, including
    /// [`ProviderError::Api`] for an `ok: false` answer.
    pub async fn fetch_info(&self, token: &BotToken) -> Result<WebhookInfo, ProviderError> {
        let envelope: ApiEnvelope<WebhookInfo> = self
            .send(token, ProviderMethod::GetWebhookInfo, None::<&()>)
            .await?;

        envelope.result.ok_or_else(|| ProviderError::Api {
            error_code: None,
            description: format!("{} returned no result", ProviderMethod::GetWebhookInfo),
        })
    }

    async fn call_with_retry<B>(
        &self,
        token: &BotToken,
        method: ProviderMethod,
        body: &B,
    ) -> Option<RegistrationResult>
    where
        B: Serialize + ?Sized,
    {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let error = match self
                .send::<serde_json::Value, B>(token, method, Some(body))
                .await
            {
                Ok(envelope) => return Some(envelope.to_registration_result()),
                Err(error) if error.is_retryable() => error,
                Err(ProviderError::Api {
                    error_code,
                    description,
                }) => return Some(RegistrationResult::failure(error_code, description)),
                Err(error) => {
                    tracing::warn!(
                        subject = token.bot_id(),
                        method = %method,
                        error = %error,
                        "Provider call failed"
                    );
                    return None;
                }
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    subject = token.bot_id(),
                    method = %method,
                    attempts = attempt,
                    error = %error,
                    "Giving up on provider call"
                );
                return None;
            }

            let delay: Duration = self.retry_policy.delay_after(&error, attempt);
            tracing::warn!(
                subject = token.bot_id(),
                method = %method,
                attempt,
                retry_after_secs = delay.as_secs_f64(),
                error = %error,
                "Retrying provider call"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Sends one request and decodes the envelope.
    ///
    /// Rate-limit answers are turned into [`ProviderError::RateLimited`] and
    /// other `ok: false` answers into [`ProviderError::Api`].
    async fn send<T, B>(
        &self,
        token: &BotToken,
        method: ProviderMethod,
        body: Option<&B>,
    ) -> Result<ApiEnvelope<T>, ProviderError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.method_url(token, method);
        let request = match method {
            ProviderMethod::GetWebhookInfo => self.client.get(&url),
            ProviderMethod::SetWebhook | ProviderMethod::DeleteWebhook => self.client.post(&url),
        };
        let request = match body {
            Some(body) => request.json(body),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let envelope: ApiEnvelope<T> =
            serde_json::from_str(&text).map_err(|e| ProviderError::Decode {
                status,
                message: e.to_string(),
            })?;

        if let Some(retry_after) = envelope.rate_limit() {
            return Err(ProviderError::RateLimited { retry_after });
        }
        if !envelope.ok {
            return Err(ProviderError::Api {
                error_code: envelope.error_code,
                description: envelope.description.unwrap_or_default(),
            });
        }

        Ok(envelope)
    }

    fn method_url(&self, token: &BotToken, method: ProviderMethod) -> String {
        format!(
            "{}/{}{}/{}",
            self.base_url,
            self.path_prefix,
            token.as_ref(),
            method.as_str()
        )
    }
}
