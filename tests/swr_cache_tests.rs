//! Integration tests for the stale-while-revalidate cache.
//!
//! These tests verify miss deduplication, stale serving with background
//! refresh, failure handling and fencing of late refreshes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hook_sync::cache::{memoize, SwrCache};
use tokio::task::JoinSet;

/// Waits long enough for spawned refresh tasks to settle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ============================================================================
// Miss Deduplication
// ============================================================================

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch_calls = Arc::clone(&calls);
    let cache = Arc::new(SwrCache::new(move |key: u32| {
        let calls = Arc::clone(&fetch_calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(key * 10)
        }
    }));

    let mut callers = JoinSet::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        callers.spawn(async move { cache.get(4).await });
    }

    while let Some(result) = callers.join_next().await {
        assert_eq!(result.unwrap(), Ok(40));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_distinct_keys_fetch_independently() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch_calls = Arc::clone(&calls);
    let cache = SwrCache::new(move |key: String| {
        let calls = Arc::clone(&fetch_calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(key.len())
        }
    });

    let (a, b) = tokio::join!(cache.get("a".to_string()), cache.get("bb".to_string()));
    assert_eq!((a, b), (Ok(1), Ok(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_cold_failure_reaches_every_waiter_and_evicts() {
    let fail = Arc::new(AtomicBool::new(true));
    let fetch_fail = Arc::clone(&fail);
    let cache = Arc::new(SwrCache::new(move |_key: u8| {
        let fail = Arc::clone(&fetch_fail);
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if fail.load(Ordering::SeqCst) {
                Err("store offline".to_string())
            } else {
                Ok(1_u8)
            }
        }
    }));

    let (first, second) = tokio::join!(cache.get(0), cache.get(0));
    assert_eq!(first, Err("store offline".to_string()));
    assert_eq!(second, Err("store offline".to_string()));
    assert!(cache.is_empty());

    fail.store(false, Ordering::SeqCst);
    assert_eq!(cache.get(0).await, Ok(1));
}

#[tokio::test]
async fn test_failing_refresh_keeps_cached_value() {
    let fail = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));
    let (fetch_fail, fetch_calls) = (Arc::clone(&fail), Arc::clone(&calls));
    let cache = SwrCache::new(move |_key: u8| {
        let (fail, calls) = (Arc::clone(&fetch_fail), Arc::clone(&fetch_calls));
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            if fail.load(Ordering::SeqCst) {
                Err("timeout".to_string())
            } else {
                Ok("v1".to_string())
            }
        }
    });

    assert_eq!(cache.get(1).await, Ok("v1".to_string()));
    fail.store(true, Ordering::SeqCst);

    // Served from cache; the refresh runs and fails in the background.
    assert_eq!(cache.get(1).await, Ok("v1".to_string()));
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.peek(&1), Some("v1".to_string()));
    assert_eq!(cache.get(1).await, Ok("v1".to_string()));
}

// ============================================================================
// Background Refresh
// ============================================================================

#[tokio::test]
async fn test_hit_returns_stale_value_then_refreshes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch_calls = Arc::clone(&calls);
    let cache = SwrCache::new(move |_key: u8| {
        let calls = Arc::clone(&fetch_calls);
        async move { Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst) + 1) }
    });

    assert_eq!(cache.get(0).await, Ok(1));
    assert_eq!(cache.get(0).await, Ok(1));
    settle().await;

    assert_eq!(cache.peek(&0), Some(2));
    assert_eq!(cache.get(0).await, Ok(2));
}

#[tokio::test]
async fn test_delete_during_refresh_is_not_resurrected() {
    let cache = SwrCache::new(move |_key: u8| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, String>("fresh".to_string())
    });

    cache.set("seeded".to_string(), 0);
    assert_eq!(cache.get(0).await, Ok("seeded".to_string()));
    cache.delete(&0);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(cache.peek(&0), None);
}

#[tokio::test]
async fn test_set_during_refresh_wins_over_late_result() {
    let cache = SwrCache::new(move |_key: u8| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok::<_, String>("late".to_string())
    });

    cache.set("first".to_string(), 0);
    assert_eq!(cache.get(0).await, Ok("first".to_string()));
    cache.set("explicit".to_string(), 0);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(cache.peek(&0), Some("explicit".to_string()));
}

// ============================================================================
// Memoize
// ============================================================================

#[tokio::test]
async fn test_memoized_clear_forces_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch_calls = Arc::clone(&calls);
    let lookup = memoize(move |(): ()| {
        let calls = Arc::clone(&fetch_calls);
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst))
        }
    });

    assert_eq!(lookup.call(()).await, Ok(0));
    lookup.clear();
    assert_eq!(lookup.call(()).await, Ok(1));
}
