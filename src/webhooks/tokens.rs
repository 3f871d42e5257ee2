//! In-process registry of bot tokens.
//!
//! Tokens are credentials and are kept in memory only. The orchestrator
//! records the token of every subject it ensures, and the reconciliation loop
//! looks tokens up through [`TokenSource`].

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::config::BotToken;
use crate::BoxFuture;

/// Resolves the bot token of a subject.
pub trait TokenSource: Send + Sync + 'static {
    /// Returns the token of `subject_id`, if known.
    fn token_for<'a>(&'a self, subject_id: &'a str) -> BoxFuture<'a, Option<BotToken>>;
}

/// Tokens keyed by subject (bot id).
///
/// # Example
///
/// ```rust
/// use hook_sync::BotToken;
/// use hook_sync::webhooks::TokenRegistry;
///
/// # tokio_test::block_on(async {
/// let registry = TokenRegistry::new();
/// registry.insert(BotToken::new("42:secret").unwrap()).await;
///
/// assert!(registry.get("42").await.is_some());
/// assert!(registry.get("43").await.is_none());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: RwLock<HashMap<String, BotToken>>,
}

impl TokenRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `token` under its bot id, returning the token it replaced.
    pub async fn insert(&self, token: BotToken) -> Option<BotToken> {
        let subject_id = token.bot_id().to_string();
        self.tokens.write().await.insert(subject_id, token)
    }

    /// Returns the token of `subject_id`.
    pub async fn get(&self, subject_id: &str) -> Option<BotToken> {
        self.tokens.read().await.get(subject_id).cloned()
    }

    /// Forgets the token of `subject_id`.
    pub async fn remove(&self, subject_id: &str) -> Option<BotToken> {
        self.tokens.write().await.remove(subject_id)
    }

    /// Returns the number of known tokens.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Returns `true` if no token is known.
    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

impl TokenSource for TokenRegistry {
    fn token_for<'a>(&'a self, subject_id: &'a str) -> BoxFuture<'a, Option<BotToken>> {
        Box::pin(self.get(subject_id))
    }
}
