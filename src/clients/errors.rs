//! Error types for provider communication.
//!
//! - [`ProviderError::Transport`]: the request never produced a response
//! - [`ProviderError::Decode`]: a response arrived but was not a provider
//!   envelope (proxies, HTML error pages); handled like a transport failure
//! - [`ProviderError::RateLimited`]: the provider asked to slow down
//! - [`ProviderError::Api`]: a well-formed `ok: false` answer
//!
//! Only the first three are retried. [`RegistrationClient::register`]
//! reports exhausted retries as `None` rather than as an error.
//!
//! [`RegistrationClient::register`]: super::RegistrationClient::register

use thiserror::Error;

/// Failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network or connection error.
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not a provider envelope.
    #[error("Unreadable provider response (HTTP {status}): {message}")]
    Decode {
        /// HTTP status of the response.
        status: u16,
        /// Parser message.
        message: String,
    },

    /// The provider rate limited the call.
    #[error("Rate limited by provider (retry after {retry_after:?} s)")]
    RateLimited {
        /// Seconds to wait, when the provider said.
        retry_after: Option<u64>,
    },

    /// The provider rejected the call.
    #[error("Provider error {error_code:?}: {description}")]
    Api {
        /// Provider error code.
        error_code: Option<i64>,
        /// Provider description.
        description: String,
    },
}

impl ProviderError {
    /// Returns `true` for failures worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Api { .. })
    }
}
