//! Stale-while-revalidate caching.
//!
//! - [`SwrCache`]: key/value cache that deduplicates concurrent misses and
//!   refreshes hits in the background
//! - [`memoize`] / [`Memoized`]: the same cache behind a plain callable, for
//!   idempotent lookups that do not warrant an explicit cache object
//!
//! The cache is a rebuildable projection of recent reads and is never a
//! source of truth.

mod memoize;
mod swr;

pub use memoize::{memoize, Memoized};
pub use swr::SwrCache;
