//! Configuration error types for the hook sync crate.
//!
//! All configuration constructors return `Result<T, ConfigError>` so invalid
//! values are rejected before any store or provider traffic happens.
//!
//! # Example
//!
//! ```rust
//! use hook_sync::{BotToken, ConfigError};
//!
//! let result = BotToken::new("");
//! assert!(matches!(result, Err(ConfigError::EmptyBotToken)));
//! ```

use thiserror::Error;

/// Errors that can occur while building a [`SyncConfig`](crate::SyncConfig)
/// or one of its validated values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Bot token cannot be empty.
    #[error("Bot token cannot be empty. Please provide the token issued by the provider.")]
    EmptyBotToken,

    /// Bot token does not have the `<id>:<secret>` shape.
    #[error("Invalid bot token '{token_hint}'. Expected format: '<bot id>:<secret>'.")]
    InvalidBotToken {
        /// The leading part of the rejected token (never the secret).
        token_hint: String,
    },

    /// Provider base URL is invalid.
    #[error("Invalid provider base URL '{url}'. Expected an http:// or https:// URL.")]
    InvalidBaseUrl {
        /// The URL that was provided.
        url: String,
    },

    /// Signing key cannot be empty.
    #[error("Secret signing key cannot be empty.")]
    EmptySigningKey,

    /// A required field is missing.
    #[error("Missing required field: '{field}'. This field must be set before building the configuration.")]
    MissingRequiredField {
        /// The name of the missing field.
        field: &'static str,
    },

    /// The reconciliation interval must be non-zero.
    #[error("Reconciliation interval must be greater than zero.")]
    InvalidInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_bot_token_message_shows_hint_only() {
        let error = ConfigError::InvalidBotToken {
            token_hint: "12345".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("12345"));
        assert!(message.contains("<bot id>:<secret>"));
    }

    #[test]
    fn test_missing_required_field_error_message() {
        let error = ConfigError::MissingRequiredField {
            field: "api_base_url",
        };
        let message = error.to_string();
        assert!(message.contains("api_base_url"));
        assert!(message.contains("must be set"));
    }

    #[test]
    fn test_error_implements_std_error() {
        let error = ConfigError::EmptyBotToken;
        let _: &dyn std::error::Error = &error;
    }
}
