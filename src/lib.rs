//! # Hook Sync
//!
//! Keeps bot webhook registrations at a push-notification provider in step
//! with a versioned local record of what each bot should be subscribed to.
//!
//! ## Overview
//!
//! This crate provides:
//! - Type-safe configuration via [`SyncConfig`] and [`SyncConfigBuilder`]
//! - A stale-while-revalidate cache ([`cache::SwrCache`]) with deduplicated
//!   misses and fenced background refreshes
//! - A hook state store ([`store::HookStateStore`]) with version CAS and
//!   timing-ordered conditional writes
//! - A registration client ([`clients::RegistrationClient`]) with retries and
//!   change detection over provider responses
//! - The sync orchestrator ([`webhooks::WebhookSync`])
//! - A reconciliation loop ([`reconcile::Reconciler`]) mirroring the
//!   provider's view into the store
//!
//! ## Quick Start
//!
//! ```rust
//! use hook_sync::{ApiBaseUrl, SigningKey, SyncConfig};
//!
//! let config = SyncConfig::builder()
//!     .api_base_url(ApiBaseUrl::new("https://api.telegram.org").unwrap())
//!     .secret_signing_key(SigningKey::new("server-side-key").unwrap())
//!     .build()
//!     .unwrap();
//! ```
//!
//! ## Ensuring a Webhook
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hook_sync::BotToken;
//! use hook_sync::clients::{RegistrationClient, SetWebhookParams};
//! use hook_sync::reconcile::Reconciler;
//! use hook_sync::store::{HookStateStore, MemoryBackend};
//! use hook_sync::webhooks::{TokenRegistry, WebhookSync};
//!
//! let client = Arc::new(RegistrationClient::new(&config)?);
//! let store = Arc::new(HookStateStore::with_backend(Arc::new(MemoryBackend::new())));
//! let tokens = Arc::new(TokenRegistry::new());
//!
//! let sync = WebhookSync::new(&config, Arc::clone(&client), Arc::clone(&store), Arc::clone(&tokens));
//! let reconciler = Reconciler::new(&config, client, store, tokens);
//! reconciler.start();
//!
//! let token = BotToken::new("123456:ABC-def")?;
//! let report = sync
//!     .ensure_webhook(&token, SetWebhookParams::new("https://gw.example.com/hook/123456"))
//!     .await;
//! println!("{:?}", report.action);
//!
//! reconciler.stop().await;
//! ```
//!
//! ## Design Principles
//!
//! - **No global state**: the version cache and every component are injected
//! - **Fail-fast validation**: all newtypes validate on construction
//! - **Thread-safe**: all shared types are `Send + Sync`
//! - **Async-first**: designed for use with the Tokio runtime
//! - **Atomic writes**: every conditional write is one backend operation

pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod store;
pub mod webhooks;

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future returned by the crate's object-safe traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Re-export public types at crate root for convenience
pub use config::{ApiBaseUrl, BotToken, SigningKey, SyncConfig, SyncConfigBuilder};
pub use error::ConfigError;

pub use clients::{ProviderError, RegistrationClient, RegistrationResult, RetryPolicy};
pub use reconcile::{LoopState, Reconciler};
pub use store::{HookState, HookStateStore, StoreError, WriteOutcome};
pub use webhooks::{EnsureReport, SyncAction, WebhookSync};
