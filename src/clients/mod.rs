//! Provider client for webhook registration.
//!
//! # Overview
//!
//! - [`RegistrationClient`]: registers, deletes and inspects webhooks
//! - [`ChangeClassifier`] and [`ChangeSignal`]: change detection over provider
//!   descriptions
//! - [`RetryPolicy`]: retry budget and delays
//! - [`ProviderError`]: failure of a single provider call

mod classify;
mod errors;
mod registration;
mod retry;
mod types;

pub use classify::{
    ChangeClassifier, ChangeSignal, DEFAULT_CHANGED_PHRASES, DEFAULT_UNCHANGED_PHRASES,
};
pub use errors::ProviderError;
pub use registration::{RegistrationClient, SDK_VERSION};
pub use retry::RetryPolicy;
pub use types::{ProviderMethod, RegistrationResult, SetWebhookParams, WebhookInfo};
