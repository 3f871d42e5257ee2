//! Versioned hook state store.
//!
//! # Overview
//!
//! - [`HookStateStore`]: create/get/update/fail operations with
//!   optimistic concurrency, plus the timing-ordered write path
//! - [`HookStateBackend`]: the storage seam; [`MemoryBackend`] implements it
//!   in-process
//! - [`HookState`], [`HookPayload`], [`CallTiming`], [`RemoteMirror`]: record types
//! - [`WriteOutcome`], [`ConflictReason`]: results of conditional writes
//! - [`StoreError`]: store failures
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use hook_sync::store::{HookPayload, HookStateStore, MemoryBackend, WriteOutcome};
//!
//! # tokio_test::block_on(async {
//! let store = HookStateStore::with_backend(Arc::new(MemoryBackend::new()));
//!
//! store.create("7", HookPayload::new("https://gw/7", "s")).await.unwrap();
//! assert_eq!(store.set_failed("7").await.unwrap(), WriteOutcome::Applied { version: 2 });
//! # });
//! ```

mod backend;
mod errors;
mod state_store;
mod types;

pub use backend::{HookFilter, HookPatch, HookStateBackend, MemoryBackend};
pub use errors::StoreError;
pub use state_store::{version_cache, HookStateStore, VersionCache};
pub use types::{
    CallTiming, ConflictReason, HookPayload, HookState, RemoteMirror, WriteOutcome,
};
