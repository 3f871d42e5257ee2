//! Stale-while-revalidate cache with in-flight request deduplication.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::BoxFuture;

type Fetcher<A, V, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<V, E>> + Send + Sync>;
type Pending<V, E> = Arc<OnceCell<Result<V, E>>>;
type Entries<A, V, E> = Arc<Mutex<HashMap<A, Entry<V, E>>>>;

struct Entry<V, E> {
    /// Bumped whenever the entry is replaced; late fetches compare against it.
    generation: u64,
    value: Option<V>,
    pending: Option<Pending<V, E>>,
    refresh: Option<JoinHandle<()>>,
}

impl<V, E> Entry<V, E> {
    fn abort_refresh(&mut self) {
        if let Some(handle) = self.refresh.take() {
            handle.abort();
        }
    }
}

enum Lookup<V, E> {
    Hit(V),
    Wait(Pending<V, E>, u64),
}

/// A key/value cache that serves cached values immediately and refreshes
/// them in the background.
///
/// - A miss runs the fetcher once; concurrent callers for the same key await
///   the same in-flight fetch. A failed miss evicts the key and every waiter
///   receives the error.
/// - A hit returns the cached value and spawns at most one background refresh
///   for the key. A failed refresh is logged and the cached value is kept.
/// - [`set`](Self::set), [`delete`](Self::delete) and [`clear`](Self::clear)
///   bypass the fetcher. Removing or replacing an entry aborts its refresh
///   task, and a refresh that completes anyway never writes into the
///   replacement.
///
/// Keys are the fetcher's argument value, so two calls share an entry exactly
/// when their arguments are equal. `V` may itself be an `Option`: a cached
/// `None` is a valid value and is distinct from a missing entry.
///
/// Background refreshes are spawned with [`tokio::spawn`], so `get` must be
/// polled inside a Tokio runtime.
///
/// # Example
///
/// ```rust
/// use hook_sync::cache::SwrCache;
///
/// # tokio_test::block_on(async {
/// let cache = SwrCache::new(|id: u32| async move { Ok::<_, String>(id * 2) });
///
/// assert_eq!(cache.get(21).await, Ok(42));
/// cache.set(7, 21);
/// assert_eq!(cache.get(21).await, Ok(7));
/// # });
/// ```
pub struct SwrCache<A, V, E> {
    fetcher: Fetcher<A, V, E>,
    entries: Entries<A, V, E>,
    generations: AtomicU64,
}

impl<A, V, E> SwrCache<A, V, E>
where
    A: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + fmt::Display + Send + Sync + 'static,
{
    /// Creates a cache around the given fetcher.
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let fetcher: Fetcher<A, V, E> = Arc::new(move |args| Box::pin(fetch(args)));
        Self {
            fetcher,
            entries: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    /// Returns the value for `args`, fetching it on a miss and scheduling a
    /// background refresh on a hit.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error when the key was not cached and the fetch
    /// failed. Background refresh failures are never returned.
    pub async fn get(&self, args: A) -> Result<V, E> {
        match self.lookup(&args) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Wait(cell, generation) => {
                let fetcher = Arc::clone(&self.fetcher);
                let fetch_args = args.clone();
                let result = cell
                    .get_or_init(|| async move { fetcher(fetch_args).await })
                    .await
                    .clone();
                self.settle(&args, generation, &cell, &result);
                result
            }
        }
    }

    /// Stores `value` for `args` without calling the fetcher.
    pub fn set(&self, value: V, args: A) {
        let generation = self.next_generation();
        let mut entries = lock(&self.entries);
        let replaced = entries.insert(
            args,
            Entry {
                generation,
                value: Some(value),
                pending: None,
                refresh: None,
            },
        );
        if let Some(mut old) = replaced {
            old.abort_refresh();
        }
    }

    /// Removes the entry for `args`, cancelling any background refresh.
    pub fn delete(&self, args: &A) {
        if let Some(mut entry) = lock(&self.entries).remove(args) {
            entry.abort_refresh();
        }
    }

    /// Removes every entry, cancelling all background refreshes.
    pub fn clear(&self) {
        let mut entries = lock(&self.entries);
        for (_, mut entry) in entries.drain() {
            entry.abort_refresh();
        }
    }

    /// Returns the cached value for `args` without fetching or refreshing.
    #[must_use]
    pub fn peek(&self, args: &A) -> Option<V> {
        lock(&self.entries)
            .get(args)
            .and_then(|entry| entry.value.clone())
    }

    /// Returns the number of entries, including ones still being fetched.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }

    fn lookup(&self, args: &A) -> Lookup<V, E> {
        let mut entries = lock(&self.entries);

        if let Some(entry) = entries.get_mut(args) {
            if let Some(value) = &entry.value {
                let value = value.clone();
                // A refresh that panicked never cleared its handle.
                let refreshing = entry
                    .refresh
                    .as_ref()
                    .is_some_and(|handle| !handle.is_finished());
                if entry.pending.is_none() && !refreshing {
                    entry.refresh = Some(self.spawn_refresh(args.clone(), entry.generation));
                }
                return Lookup::Hit(value);
            }
            if let Some(cell) = &entry.pending {
                return Lookup::Wait(Arc::clone(cell), entry.generation);
            }
        }

        let generation = self.next_generation();
        let cell: Pending<V, E> = Arc::new(OnceCell::new());
        entries.insert(
            args.clone(),
            Entry {
                generation,
                value: None,
                pending: Some(Arc::clone(&cell)),
                refresh: None,
            },
        );
        Lookup::Wait(cell, generation)
    }

    /// Records the outcome of a foreground fetch, unless the entry was
    /// replaced or removed while the fetch was running.
    fn settle(&self, args: &A, generation: u64, cell: &Pending<V, E>, result: &Result<V, E>) {
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(args) else {
            return;
        };
        let owns_fetch = entry.generation == generation
            && entry
                .pending
                .as_ref()
                .is_some_and(|pending| Arc::ptr_eq(pending, cell));
        if !owns_fetch {
            return;
        }

        match result {
            Ok(value) => {
                entry.value = Some(value.clone());
                entry.pending = None;
            }
            Err(_) => {
                entries.remove(args);
            }
        }
    }

    fn spawn_refresh(&self, args: A, generation: u64) -> JoinHandle<()> {
        let fetcher = Arc::clone(&self.fetcher);
        let entries = Arc::clone(&self.entries);

        tokio::spawn(async move {
            let result = fetcher(args.clone()).await;

            let mut entries = lock(&entries);
            let Some(entry) = entries.get_mut(&args) else {
                return;
            };
            if entry.generation != generation {
                return;
            }
            entry.refresh = None;

            match result {
                Ok(value) => {
                    entry.value = Some(value);
                    tracing::debug!("background cache refresh completed");
                }
                Err(error) => {
                    tracing::warn!(error = %error, "background cache refresh failed, keeping cached value");
                }
            }
        })
    }
}

impl<A, V, E> Drop for SwrCache<A, V, E> {
    fn drop(&mut self) {
        let mut entries = lock(&self.entries);
        for (_, entry) in entries.iter_mut() {
            entry.abort_refresh();
        }
    }
}

impl<A, V, E> fmt::Debug for SwrCache<A, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwrCache")
            .field("entries", &lock(&self.entries).len())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
