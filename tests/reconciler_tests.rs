//! Integration tests for the reconciliation loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hook_sync::clients::RegistrationClient;
use hook_sync::reconcile::{LoopState, ReconcileError, ReconcileReport, Reconciler};
use hook_sync::store::{
    HookFilter, HookPatch, HookPayload, HookState, HookStateBackend, HookStateStore,
    MemoryBackend, StoreError,
};
use hook_sync::webhooks::TokenRegistry;
use hook_sync::{ApiBaseUrl, BoxFuture, BotToken, SyncConfig};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    store: Arc<HookStateStore>,
    tokens: Arc<TokenRegistry>,
    reconciler: Reconciler,
}

fn fixture(server: &MockServer, interval: Duration) -> Fixture {
    fixture_with_backend(server, interval, Arc::new(MemoryBackend::new()))
}

fn fixture_with_backend(
    server: &MockServer,
    interval: Duration,
    backend: Arc<dyn HookStateBackend>,
) -> Fixture {
    let config = SyncConfig::builder()
        .api_base_url(ApiBaseUrl::new(server.uri()).unwrap())
        .reconcile_interval(interval)
        .build()
        .unwrap();
    let client = Arc::new(RegistrationClient::new(&config).unwrap());
    let store = Arc::new(HookStateStore::with_backend(backend));
    let tokens = Arc::new(TokenRegistry::new());
    let reconciler = Reconciler::new(&config, client, Arc::clone(&store), tokens.clone());
    Fixture {
        store,
        tokens,
        reconciler,
    }
}

/// Memory backend whose conditional writes fail a set number of times.
struct FlakyBackend {
    inner: MemoryBackend,
    failures_left: AtomicUsize,
    write_attempts: AtomicUsize,
}

impl FlakyBackend {
    fn failing(times: usize) -> Self {
        Self {
            inner: MemoryBackend::new(),
            failures_left: AtomicUsize::new(times),
            write_attempts: AtomicUsize::new(0),
        }
    }
}

impl HookStateBackend for FlakyBackend {
    fn insert(&self, state: HookState) -> BoxFuture<'_, Result<(), StoreError>> {
        self.inner.insert(state)
    }

    fn find<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<HookState>, StoreError>> {
        self.inner.find(subject_id)
    }

    fn update_where(
        &self,
        filter: HookFilter,
        patch: HookPatch,
    ) -> BoxFuture<'_, Result<Option<HookState>, StoreError>> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if fail {
            return Box::pin(async {
                Err(StoreError::Backend {
                    message: "connection reset".to_string(),
                })
            });
        }
        self.inner.update_where(filter, patch)
    }

    fn remove<'a>(&'a self, subject_id: &'a str) -> BoxFuture<'a, Result<bool, StoreError>> {
        self.inner.remove(subject_id)
    }

    fn list_active(&self) -> BoxFuture<'_, Result<Vec<HookState>, StoreError>> {
        self.inner.list_active()
    }
}

async fn wait_for_state(reconciler: &Reconciler, expected: LoopState) {
    for _ in 0..50 {
        if reconciler.state() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(reconciler.state(), expected);
}

async fn mount_info(server: &MockServer, token: &str, url: &str, pending: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/bot{token}/getWebhookInfo")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {
                "url": url,
                "has_custom_certificate": false,
                "pending_update_count": pending,
                "max_connections": 40,
                "ip_address": "203.0.113.7"
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_tick_mirrors_remote_info_without_version_bump() {
    let server = MockServer::start().await;
    mount_info(&server, "1:a", "https://gw/1-remote", 3).await;
    mount_info(&server, "2:b", "https://gw/2", 0).await;
    let fx = fixture(&server, Duration::from_secs(60));

    fx.store.create("1", HookPayload::new("https://gw/1", "s")).await.unwrap();
    fx.store.create("2", HookPayload::new("https://gw/2", "s")).await.unwrap();
    fx.tokens.insert(BotToken::new("1:a").unwrap()).await;
    fx.tokens.insert(BotToken::new("2:b").unwrap()).await;

    let report = fx.reconciler.tick().await.unwrap();
    assert_eq!(
        report,
        ReconcileReport {
            subjects: 2,
            queried: 2,
            applied: 2,
            skipped: 0,
        }
    );

    let state = fx.store.get("1").await.unwrap().unwrap();
    let remote = state.remote.unwrap();
    assert_eq!(remote.url, "https://gw/1-remote");
    assert_eq!(remote.pending_update_count, 3);
    assert_eq!(remote.max_connections, Some(40));
    assert_eq!(state.version, 1);
    assert_eq!(state.webhook_url, "https://gw/1");
    assert!(state.reconciled_at.is_some());
}

#[tokio::test]
async fn test_tick_skips_failed_queries_and_unknown_tokens() {
    let server = MockServer::start().await;
    mount_info(&server, "1:a", "https://gw/1", 0).await;
    Mock::given(method("GET"))
        .and(path("/bot2:b/getWebhookInfo"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;
    let fx = fixture(&server, Duration::from_secs(60));

    for subject in ["1", "2", "3"] {
        fx.store
            .create(subject, HookPayload::new(format!("https://gw/{subject}"), "s"))
            .await
            .unwrap();
    }
    fx.tokens.insert(BotToken::new("1:a").unwrap()).await;
    fx.tokens.insert(BotToken::new("2:b").unwrap()).await;

    let report = fx.reconciler.tick().await.unwrap();
    assert_eq!(report.subjects, 3);
    assert_eq!(report.queried, 2);
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 2);

    assert!(fx.store.get("2").await.unwrap().unwrap().remote.is_none());
}

#[tokio::test]
async fn test_failed_subjects_are_not_reconciled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bot1:a/getWebhookInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "url": "", "pending_update_count": 0 }
        })))
        .expect(0)
        .mount(&server)
        .await;
    let fx = fixture(&server, Duration::from_secs(60));

    fx.store.create("1", HookPayload::new("https://gw/1", "s")).await.unwrap();
    fx.store.set_failed("1").await.unwrap();
    fx.tokens.insert(BotToken::new("1:a").unwrap()).await;

    let report = fx.reconciler.tick().await.unwrap();
    assert_eq!(report, ReconcileReport::default());
}

#[tokio::test]
async fn test_running_loop_reconciles_on_interval() {
    let server = MockServer::start().await;
    mount_info(&server, "1:a", "https://gw/1", 9).await;
    let fx = fixture(&server, Duration::from_millis(30));

    fx.store.create("1", HookPayload::new("https://gw/1", "s")).await.unwrap();
    fx.tokens.insert(BotToken::new("1:a").unwrap()).await;

    fx.reconciler.start();
    wait_for_state(&fx.reconciler, LoopState::Running).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    fx.reconciler.stop().await;
    assert_eq!(fx.reconciler.state(), LoopState::Stopped);

    let remote = fx.store.get("1").await.unwrap().unwrap().remote.unwrap();
    assert_eq!(remote.pending_update_count, 9);
}

#[tokio::test]
async fn test_stop_prevents_further_ticks() {
    let server = MockServer::start().await;
    let fx = fixture(&server, Duration::from_millis(20));

    fx.reconciler.start();
    fx.reconciler.stop().await;

    fx.store.create("1", HookPayload::new("https://gw/1", "s")).await.unwrap();
    fx.tokens.insert(BotToken::new("1:a").unwrap()).await;
    mount_info(&server, "1:a", "https://gw/1", 1).await;

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(fx.store.get("1").await.unwrap().unwrap().remote.is_none());
}

#[tokio::test]
async fn test_tick_store_error_abandons_tick() {
    let server = MockServer::start().await;
    mount_info(&server, "1:a", "https://gw/1", 2).await;
    let backend = Arc::new(FlakyBackend::failing(1));
    let fx = fixture_with_backend(&server, Duration::from_secs(60), backend.clone());

    fx.store.create("1", HookPayload::new("https://gw/1", "s")).await.unwrap();
    fx.tokens.insert(BotToken::new("1:a").unwrap()).await;

    let error = fx.reconciler.tick().await.unwrap_err();
    assert!(matches!(error, ReconcileError::Store(StoreError::Backend { .. })));
    assert!(fx.store.get("1").await.unwrap().unwrap().remote.is_none());

    let report = fx.reconciler.tick().await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(backend.write_attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_running_loop_survives_failed_ticks() {
    let server = MockServer::start().await;
    mount_info(&server, "1:a", "https://gw/1", 5).await;
    let backend = Arc::new(FlakyBackend::failing(2));
    let fx = fixture_with_backend(&server, Duration::from_millis(20), backend.clone());

    fx.store.create("1", HookPayload::new("https://gw/1", "s")).await.unwrap();
    fx.tokens.insert(BotToken::new("1:a").unwrap()).await;

    fx.reconciler.start();
    tokio::time::sleep(Duration::from_millis(250)).await;
    fx.reconciler.stop().await;

    assert!(backend.write_attempts.load(Ordering::SeqCst) >= 3);
    let remote = fx.store.get("1").await.unwrap().unwrap().remote.unwrap();
    assert_eq!(remote.pending_update_count, 5);
}

async fn mount_slow_info(server: &MockServer, token: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(format!("/bot{token}/getWebhookInfo")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "ok": true,
                    "result": { "url": "https://gw/1", "pending_update_count": 0 }
                }))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_interrupted_stop_can_be_finished() {
    let server = MockServer::start().await;
    mount_slow_info(&server, "1:a", Duration::from_millis(300)).await;
    let fx = fixture(&server, Duration::from_millis(20));

    fx.store.create("1", HookPayload::new("https://gw/1", "s")).await.unwrap();
    fx.tokens.insert(BotToken::new("1:a").unwrap()).await;

    fx.reconciler.start();
    tokio::time::sleep(Duration::from_millis(60)).await;

    // The tick in progress outlives the timeout.
    let interrupted = tokio::time::timeout(Duration::from_millis(20), fx.reconciler.stop()).await;
    assert!(interrupted.is_err());
    assert_eq!(fx.reconciler.state(), LoopState::Stopping);

    // Still winding down, so start is ignored.
    fx.reconciler.start();
    assert_eq!(fx.reconciler.state(), LoopState::Stopping);

    fx.reconciler.stop().await;
    assert_eq!(fx.reconciler.state(), LoopState::Stopped);

    fx.reconciler.start();
    wait_for_state(&fx.reconciler, LoopState::Running).await;
    fx.reconciler.stop().await;
    assert_eq!(fx.reconciler.state(), LoopState::Stopped);
}

#[tokio::test]
async fn test_start_after_interrupted_stop_restarts_exited_loop() {
    let server = MockServer::start().await;
    mount_slow_info(&server, "1:a", Duration::from_millis(200)).await;
    let fx = fixture(&server, Duration::from_millis(20));

    fx.store.create("1", HookPayload::new("https://gw/1", "s")).await.unwrap();
    fx.tokens.insert(BotToken::new("1:a").unwrap()).await;

    fx.reconciler.start();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let interrupted = tokio::time::timeout(Duration::from_millis(10), fx.reconciler.stop()).await;
    assert!(interrupted.is_err());

    // Let the cancelled loop finish its tick and exit.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(fx.reconciler.state(), LoopState::Stopping);

    fx.reconciler.start();
    wait_for_state(&fx.reconciler, LoopState::Running).await;
    fx.reconciler.stop().await;
    assert_eq!(fx.reconciler.state(), LoopState::Stopped);
}
