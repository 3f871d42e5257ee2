//! Secret tokens for provider callbacks.
//!
//! The provider echoes the `secret_token` given at registration in the
//! [`SECRET_TOKEN_HEADER`] header of every callback. Tokens are derived per
//! subject from a server-side [`SigningKey`], so they never need to be
//! stored anywhere but the hook state record.
//!
//! # Example
//!
//! ```rust
//! use hook_sync::SigningKey;
//! use hook_sync::webhooks::{derive_secret_token, verify_secret_token};
//!
//! let key = SigningKey::new("server-side-key").unwrap();
//! let token = derive_secret_token(&key, "123456");
//!
//! assert!(verify_secret_token(&token, Some(&token)).is_ok());
//! assert!(verify_secret_token(&token, Some("forged")).is_err());
//! ```
//!
//! # Security
//!
//! Comparisons run in constant time.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::errors::SecretTokenError;
use crate::config::SigningKey;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the secret token on provider callbacks.
pub const SECRET_TOKEN_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Derives the callback secret token of `subject_id`.
///
/// HMAC-SHA256 of the subject id, URL-safe base64 without padding. The
/// output only uses `A-Z`, `a-z`, `0-9`, `_` and `-` as the provider
/// requires, and is 43 characters long.
#[must_use]
#[allow(clippy::missing_panics_doc)] // HMAC accepts any key size, so this never panics
pub fn derive_secret_token(key: &SigningKey, subject_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_ref().as_bytes()).expect("HMAC can take key of any size");
    mac.update(subject_id.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

/// Checks the token presented on a callback against the expected one.
///
/// # Errors
///
/// Returns [`SecretTokenError::Missing`] when no token was presented and
/// [`SecretTokenError::Mismatch`] when it differs.
pub fn verify_secret_token(expected: &str, presented: Option<&str>) -> Result<(), SecretTokenError> {
    let presented = presented.ok_or(SecretTokenError::Missing)?;
    if bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) {
        Ok(())
    } else {
        Err(SecretTokenError::Mismatch)
    }
}
