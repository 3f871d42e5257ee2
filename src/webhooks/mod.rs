//! Webhook synchronization for bot subjects.
//!
//! # Overview
//!
//! - [`WebhookSync`]: the sync orchestrator (`ensure_webhook`)
//! - [`TokenRegistry`] and [`TokenSource`]: in-memory bot token lookup
//! - [`derive_secret_token`] and [`verify_secret_token`]: callback secret
//!   tokens
//! - [`SecretTokenError`]: verification failures

mod errors;
mod orchestrator;
mod tokens;
mod verification;

pub use errors::SecretTokenError;
pub use orchestrator::{EnsureReport, SyncAction, WebhookSync};
pub use tokens::{TokenRegistry, TokenSource};
pub use verification::{derive_secret_token, verify_secret_token, SECRET_TOKEN_HEADER};
