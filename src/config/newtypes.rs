//! Validated newtype wrappers for configuration values.
//!
//! These wrappers validate their contents on construction. Secrets mask their
//! value in `Debug` output so they never end up in logs.

use crate::error::ConfigError;
use std::fmt;

/// A validated provider bot token of the form `<bot id>:<secret>`.
///
/// The `Debug` implementation only shows the bot id.
///
/// # Example
///
/// ```rust
/// use hook_sync::BotToken;
///
/// let token = BotToken::new("123456:ABC-def").unwrap();
/// assert_eq!(token.bot_id(), "123456");
/// assert_eq!(format!("{token:?}"), "BotToken(123456:*****)");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BotToken {
    raw: String,
    id_end: usize,
}

impl BotToken {
    /// Creates a new validated bot token.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyBotToken`] if the token is empty, or
    /// [`ConfigError::InvalidBotToken`] if it lacks a non-empty id and secret
    /// separated by `:`.
    pub fn new(token: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = token.into().trim().to_string();
        if raw.is_empty() {
            return Err(ConfigError::EmptyBotToken);
        }

        let Some((id, secret)) = raw.split_once(':') else {
            return Err(ConfigError::InvalidBotToken {
                token_hint: raw.chars().take(6).collect(),
            });
        };

        if id.is_empty() || secret.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidBotToken {
                token_hint: id.chars().take(12).collect(),
            });
        }

        Ok(Self {
            id_end: id.len(),
            raw,
        })
    }

    /// Returns the bot id embedded in the token.
    #[must_use]
    pub fn bot_id(&self) -> &str {
        &self.raw[..self.id_end]
    }
}

impl AsRef<str> for BotToken {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for BotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BotToken({}:*****)", self.bot_id())
    }
}

/// A validated provider base URL, e.g. `https://api.telegram.org`.
///
/// Trailing slashes are trimmed so paths can be appended directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiBaseUrl(String);

impl ApiBaseUrl {
    /// Creates a new validated base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the URL is not http(s) or
    /// has no host part.
    pub fn new(url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        let trimmed = url.trim().trim_end_matches('/');

        let host = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"));

        match host {
            Some(host) if !host.is_empty() => Ok(Self(trimmed.to_string())),
            _ => Err(ConfigError::InvalidBaseUrl { url }),
        }
    }
}

impl AsRef<str> for ApiBaseUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Key used to derive per-subject callback secret tokens.
///
/// # Example
///
/// ```rust
/// use hook_sync::SigningKey;
///
/// let key = SigningKey::new("server-side-key").unwrap();
/// assert_eq!(format!("{key:?}"), "SigningKey(*****)");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(String);

impl SigningKey {
    /// Creates a new signing key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySigningKey`] if the key is empty.
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ConfigError::EmptySigningKey);
        }
        Ok(Self(key))
    }
}

impl AsRef<str> for SigningKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(*****)")
    }
}
