//! Request and response types for the provider's webhook API.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Provider API methods used by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderMethod {
    /// `POST setWebhook`
    SetWebhook,
    /// `GET getWebhookInfo`
    GetWebhookInfo,
    /// `POST deleteWebhook`
    DeleteWebhook,
}

impl ProviderMethod {
    /// Returns the method name used in the URL path.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SetWebhook => "setWebhook",
            Self::GetWebhookInfo => "getWebhookInfo",
            Self::DeleteWebhook => "deleteWebhook",
        }
    }
}

impl fmt::Display for ProviderMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a `setWebhook` call.
///
/// # Example
///
/// ```rust
/// use hook_sync::clients::SetWebhookParams;
///
/// let params = SetWebhookParams::new("https://gw.example.com/hook/42")
///     .allowed_updates(vec!["message".to_string()])
///     .secret_token("s3cr3t");
///
/// let body = serde_json::to_value(&params).unwrap();
/// assert_eq!(body["url"], "https://gw.example.com/hook/42");
/// assert_eq!(body["secret_token"], "s3cr3t");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SetWebhookParams {
    /// Callback URL.
    pub url: String,
    /// Update types to deliver; `None` keeps the provider default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_updates: Option<Vec<String>>,
    /// Secret token the provider sends back on every callback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_token: Option<String>,
}

impl SetWebhookParams {
    /// Creates parameters for the given callback URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            allowed_updates: None,
            secret_token: None,
        }
    }

    /// Restricts the delivered update types.
    #[must_use]
    pub fn allowed_updates(mut self, updates: Vec<String>) -> Self {
        self.allowed_updates = Some(updates);
        self
    }

    /// Sets the callback secret token.
    #[must_use]
    pub fn secret_token(mut self, token: impl Into<String>) -> Self {
        self.secret_token = Some(token.into());
        self
    }
}

/// Outcome of a registration call as reported by the provider.
///
/// Produced per call and consumed immediately; never persisted as-is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationResult {
    /// Whether the provider accepted the call.
    pub ok: bool,
    /// Free-text description from the provider.
    pub description: String,
    /// Provider error code, for failed calls.
    pub error_code: Option<i64>,
    /// Seconds the provider asked to wait, for rate-limited calls.
    pub retry_after: Option<u64>,
}

impl RegistrationResult {
    /// Creates a successful result with the given description.
    #[must_use]
    pub fn success(description: impl Into<String>) -> Self {
        Self {
            ok: true,
            description: description.into(),
            error_code: None,
            retry_after: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(error_code: Option<i64>, description: impl Into<String>) -> Self {
        Self {
            ok: false,
            description: description.into(),
            error_code,
            retry_after: None,
        }
    }
}

/// The provider's authoritative view of a webhook registration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookInfo {
    /// Registered URL; empty when no webhook is set.
    #[serde(default)]
    pub url: String,
    /// Whether a custom certificate was uploaded.
    #[serde(default)]
    pub has_custom_certificate: bool,
    /// Updates awaiting delivery.
    #[serde(default)]
    pub pending_update_count: u64,
    /// IP address the provider resolved for the URL.
    pub ip_address: Option<String>,
    /// Unix time of the most recent delivery error.
    pub last_error_date: Option<i64>,
    /// Description of the most recent delivery error.
    pub last_error_message: Option<String>,
    /// Maximum simultaneous connections.
    pub max_connections: Option<u32>,
    /// Update types delivered.
    pub allowed_updates: Option<Vec<String>>,
}

/// Extra fields the provider attaches to some failures.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct ResponseParameters {
    pub retry_after: Option<u64>,
}

/// The JSON envelope every provider response is wrapped in.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

/// Provider error code for rate-limited calls.
pub(crate) const RATE_LIMITED_CODE: i64 = 429;

impl<T> ApiEnvelope<T> {
    /// Returns `Some(retry_after)` if the envelope signals rate limiting.
    pub fn rate_limit(&self) -> Option<Option<u64>> {
        let retry_after = self.parameters.as_ref().and_then(|p| p.retry_after);
        if self.ok {
            return None;
        }
        if self.error_code == Some(RATE_LIMITED_CODE) || retry_after.is_some() {
            return Some(retry_after);
        }
        None
    }

    pub fn to_registration_result(&self) -> RegistrationResult {
        RegistrationResult {
            ok: self.ok,
            description: self.description.clone().unwrap_or_default(),
            error_code: self.error_code,
            retry_after: self.parameters.as_ref().and_then(|p| p.retry_after),
        }
    }
}
