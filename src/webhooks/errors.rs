//! Error types for callback secret-token verification.

use thiserror::Error;

/// Failure to verify the secret token of an inbound provider callback.
///
/// # Example
///
/// ```rust
/// use hook_sync::webhooks::{verify_secret_token, SecretTokenError};
///
/// let result = verify_secret_token("expected", None);
/// assert_eq!(result, Err(SecretTokenError::Missing));
/// ```
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SecretTokenError {
    /// The callback carried no secret-token header.
    #[error("Callback is missing the secret token header.")]
    Missing,

    /// The presented token does not match the registered one.
    #[error("Callback secret token does not match.")]
    Mismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_do_not_echo_tokens() {
        assert!(SecretTokenError::Mismatch.to_string().contains("does not match"));
        assert!(SecretTokenError::Missing.to_string().contains("missing"));
    }
}
