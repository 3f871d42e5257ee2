//! Ad-hoc memoization of idempotent async lookups.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use super::SwrCache;

/// A callable wrapper around a private [`SwrCache`].
///
/// Cloning a `Memoized` shares the underlying cache, so every clone sees the
/// same entries and the same management surface.
///
/// # Example
///
/// ```rust
/// use hook_sync::cache::memoize;
///
/// # tokio_test::block_on(async {
/// let lookup = memoize(|name: String| async move { Ok::<_, String>(name.len()) });
///
/// assert_eq!(lookup.call("hook".to_string()).await, Ok(4));
/// lookup.delete(&"hook".to_string());
/// lookup.clear();
/// # });
/// ```
pub struct Memoized<A, V, E> {
    cache: Arc<SwrCache<A, V, E>>,
}

/// Wraps `fetch` in a stale-while-revalidate cache.
pub fn memoize<A, V, E, F, Fut>(fetch: F) -> Memoized<A, V, E>
where
    A: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + fmt::Display + Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    Memoized {
        cache: Arc::new(SwrCache::new(fetch)),
    }
}

impl<A, V, E> Memoized<A, V, E>
where
    A: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + fmt::Display + Send + Sync + 'static,
{
    /// Calls the wrapped lookup through the cache.
    ///
    /// # Errors
    ///
    /// Returns the lookup's error when the arguments were not cached and the
    /// lookup failed.
    pub async fn call(&self, args: A) -> Result<V, E> {
        self.cache.get(args).await
    }

    /// Stores a value for `args` without calling the lookup.
    pub fn set(&self, value: V, args: A) {
        self.cache.set(value, args);
    }

    /// Forgets the cached value for `args`.
    pub fn delete(&self, args: &A) {
        self.cache.delete(args);
    }

    /// Forgets every cached value.
    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl<A, V, E> Clone for Memoized<A, V, E> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<A, V, E> fmt::Debug for Memoized<A, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized").field("cache", &self.cache).finish()
    }
}
