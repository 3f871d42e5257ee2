//! Configuration types for the hook sync crate.
//!
//! # Overview
//!
//! - [`SyncConfig`]: all settings shared by the registration client, the
//!   orchestrator and the reconciliation loop
//! - [`SyncConfigBuilder`]: builder for [`SyncConfig`]
//! - [`BotToken`], [`ApiBaseUrl`], [`SigningKey`]: validated newtypes
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use hook_sync::{ApiBaseUrl, SyncConfig};
//!
//! let config = SyncConfig::builder()
//!     .api_base_url(ApiBaseUrl::new("https://api.telegram.org").unwrap())
//!     .reconcile_interval(Duration::from_secs(10))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.path_prefix(), "bot");
//! ```

mod newtypes;

pub use newtypes::{ApiBaseUrl, BotToken, SigningKey};

use std::time::Duration;

use crate::clients::{ChangeClassifier, RetryPolicy};
use crate::error::ConfigError;

/// Default interval between two reconciliation ticks.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(4);

/// Default path prefix placed in front of the bot token in provider URLs.
pub const DEFAULT_PATH_PREFIX: &str = "bot";

/// Configuration shared by every component of the crate.
///
/// `SyncConfig` is `Clone`, `Send` and `Sync`.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    api_base_url: ApiBaseUrl,
    path_prefix: String,
    reconcile_interval: Duration,
    retry_policy: RetryPolicy,
    classifier: ChangeClassifier,
    secret_signing_key: Option<SigningKey>,
    user_agent_prefix: Option<String>,
}

impl SyncConfig {
    /// Creates a new builder for constructing a `SyncConfig`.
    #[must_use]
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// Returns the provider base URL.
    #[must_use]
    pub const fn api_base_url(&self) -> &ApiBaseUrl {
        &self.api_base_url
    }

    /// Returns the path prefix placed before the token (`/<prefix><token>/<method>`).
    #[must_use]
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Returns the reconciliation interval.
    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        self.reconcile_interval
    }

    /// Returns the retry policy used for provider calls.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the response classifier.
    #[must_use]
    pub const fn classifier(&self) -> &ChangeClassifier {
        &self.classifier
    }

    /// Returns the key used to derive callback secret tokens, if configured.
    #[must_use]
    pub const fn secret_signing_key(&self) -> Option<&SigningKey> {
        self.secret_signing_key.as_ref()
    }

    /// Returns the user agent prefix, if configured.
    #[must_use]
    pub fn user_agent_prefix(&self) -> Option<&str> {
        self.user_agent_prefix.as_deref()
    }
}

// Verify SyncConfig is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SyncConfig>();
};

/// Builder for constructing [`SyncConfig`] instances.
///
/// `api_base_url` is required. Defaults:
///
/// - `path_prefix`: `"bot"`
/// - `reconcile_interval`: 4 seconds
/// - `retry_policy`: [`RetryPolicy::default`]
/// - `classifier`: [`ChangeClassifier::default`]
/// - `secret_signing_key`, `user_agent_prefix`: `None`
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    api_base_url: Option<ApiBaseUrl>,
    path_prefix: Option<String>,
    reconcile_interval: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
    classifier: Option<ChangeClassifier>,
    secret_signing_key: Option<SigningKey>,
    user_agent_prefix: Option<String>,
}

impl SyncConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the provider base URL (required).
    #[must_use]
    pub fn api_base_url(mut self, url: ApiBaseUrl) -> Self {
        self.api_base_url = Some(url);
        self
    }

    /// Sets the path prefix placed in front of the token.
    #[must_use]
    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    /// Sets the interval between reconciliation ticks.
    #[must_use]
    pub const fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = Some(interval);
        self
    }

    /// Sets the retry policy for provider calls.
    #[must_use]
    pub const fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Replaces the provider phrase sets used for change detection.
    ///
    /// Provider wording changes are handled here rather than in code.
    #[must_use]
    pub fn classifier(mut self, classifier: ChangeClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Sets the key used to derive callback secret tokens.
    #[must_use]
    pub fn secret_signing_key(mut self, key: SigningKey) -> Self {
        self.secret_signing_key = Some(key);
        self
    }

    /// Sets the user agent prefix for provider requests.
    #[must_use]
    pub fn user_agent_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_agent_prefix = Some(prefix.into());
        self
    }

    /// Builds the [`SyncConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRequiredField`] if `api_base_url` is not
    /// set, or [`ConfigError::InvalidInterval`] for a zero interval.
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        let api_base_url = self.api_base_url.ok_or(ConfigError::MissingRequiredField {
            field: "api_base_url",
        })?;

        let reconcile_interval = self
            .reconcile_interval
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL);
        if reconcile_interval.is_zero() {
            return Err(ConfigError::InvalidInterval);
        }

        Ok(SyncConfig {
            api_base_url,
            path_prefix: self
                .path_prefix
                .unwrap_or_else(|| DEFAULT_PATH_PREFIX.to_string()),
            reconcile_interval,
            retry_policy: self.retry_policy.unwrap_or_default(),
            classifier: self.classifier.unwrap_or_default(),
            secret_signing_key: self.secret_signing_key,
            user_agent_prefix: self.user_agent_prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> ApiBaseUrl {
        ApiBaseUrl::new("https://api.example.org").unwrap()
    }

    #[test]
    fn test_builder_requires_base_url() {
        let result = SyncConfigBuilder::new().build();
        assert!(matches!(
            result,
            Err(ConfigError::MissingRequiredField {
                field: "api_base_url"
            })
        ));
    }

    #[test]
    fn test_builder_applies_defaults() {
        let config = SyncConfig::builder().api_base_url(base_url()).build().unwrap();

        assert_eq!(config.path_prefix(), "bot");
        assert_eq!(config.reconcile_interval(), Duration::from_secs(4));
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert!(config.secret_signing_key().is_none());
        assert!(config.user_agent_prefix().is_none());
    }

    #[test]
    fn test_builder_rejects_zero_interval() {
        let result = SyncConfig::builder()
            .api_base_url(base_url())
            .reconcile_interval(Duration::ZERO)
            .build();
        assert_eq!(result.unwrap_err(), ConfigError::InvalidInterval);
    }

    #[test]
    fn test_builder_overrides() {
        let config = SyncConfig::builder()
            .api_base_url(base_url())
            .path_prefix("hook")
            .reconcile_interval(Duration::from_millis(250))
            .secret_signing_key(SigningKey::new("k").unwrap())
            .user_agent_prefix("Gateway/2.1")
            .build()
            .unwrap();

        assert_eq!(config.path_prefix(), "hook");
        assert_eq!(config.reconcile_interval(), Duration::from_millis(250));
        assert!(config.secret_signing_key().is_some());
        assert_eq!(config.user_agent_prefix(), Some("Gateway/2.1"));
    }
}
