//! Periodic drift correction between the provider and the store.
//!
//! Every tick lists the active subjects, asks the provider for each
//! subject's current registration and overwrites the mirrored fields of the
//! stored record. The loop never competes with the orchestrator for the
//! canonical state: mirror writes ignore and keep the version.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::errors::ReconcileError;
use crate::cache::{memoize, Memoized};
use crate::clients::RegistrationClient;
use crate::config::SyncConfig;
use crate::store::{HookState, HookStateStore, RemoteMirror, StoreError};
use crate::webhooks::TokenSource;

/// Lifecycle of a [`Reconciler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Never started.
    Initial,
    /// `start()` spawned the loop; it has not run yet.
    Starting,
    /// Ticks are being scheduled.
    Running,
    /// `stop()` is waiting for the loop to exit.
    Stopping,
    /// The loop exited; it may be started again.
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Initial => "initial",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Counters of one reconciliation tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Active subjects listed.
    pub subjects: usize,
    /// Provider queries issued.
    pub queried: usize,
    /// Mirror writes that landed.
    pub applied: usize,
    /// Subjects without a known token or without a provider answer.
    pub skipped: usize,
}

struct Shared {
    client: Arc<RegistrationClient>,
    store: Arc<HookStateStore>,
    tokens: Arc<dyn TokenSource>,
    active: Memoized<(), Vec<HookState>, StoreError>,
}

struct Lifecycle {
    state: LoopState,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Reconciliation loop.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use hook_sync::reconcile::{LoopState, Reconciler};
///
/// let reconciler = Reconciler::new(&config, client, store, tokens);
/// reconciler.start();
///
/// reconciler.stop().await;
/// assert_eq!(reconciler.state(), LoopState::Stopped);
/// ```
pub struct Reconciler {
    shared: Arc<Shared>,
    interval: Duration,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl Reconciler {
    /// Creates a stopped reconciler.
    ///
    /// The active subject list is read through a stale-while-revalidate
    /// cache, so each tick works on the list as of the previous refresh.
    #[must_use]
    pub fn new(
        config: &SyncConfig,
        client: Arc<RegistrationClient>,
        store: Arc<HookStateStore>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        let lister = Arc::clone(&store);
        let active = memoize(move |(): ()| {
            let store = Arc::clone(&lister);
            async move { store.list_active().await }
        });

        Self {
            shared: Arc::new(Shared {
                client,
                store,
                tokens,
                active,
            }),
            interval: config.reconcile_interval(),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: LoopState::Initial,
                cancel: None,
                task: None,
            })),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LoopState {
        lock(&self.lifecycle).state
    }

    /// Returns the tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts the loop. The first tick runs one interval from now.
    ///
    /// The state is `Starting` until the spawned loop first runs, then
    /// `Running`. Does nothing while the loop is starting or running, or
    /// while a stop is still waiting for the loop to exit.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        match lifecycle.state {
            LoopState::Starting | LoopState::Running => return,
            LoopState::Stopping => {
                // A dropped stop() leaves the exited loop's handle behind.
                if !lifecycle.task.as_ref().is_some_and(JoinHandle::is_finished) {
                    warn!("reconciler is stopping, ignoring start");
                    return;
                }
                lifecycle.task = None;
            }
            LoopState::Initial | LoopState::Stopped => {}
        }

        lifecycle.state = LoopState::Starting;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            Arc::clone(&self.shared),
            Arc::clone(&self.lifecycle),
            self.interval,
            cancel.clone(),
        ));
        lifecycle.cancel = Some(cancel);
        lifecycle.task = Some(task);
    }

    /// Stops scheduling ticks and waits for the loop to exit.
    ///
    /// A tick already in progress runs to completion. Does nothing unless
    /// the loop is starting, running or stopping. If a previous `stop()` was
    /// dropped before the loop exited, this call finishes that stop. A call
    /// made while another `stop()` is waiting returns immediately.
    pub async fn stop(&self) {
        let task = {
            let mut lifecycle = lock(&self.lifecycle);
            match lifecycle.state {
                LoopState::Starting | LoopState::Running => {
                    lifecycle.state = LoopState::Stopping;
                    if let Some(cancel) = lifecycle.cancel.take() {
                        cancel.cancel();
                    }
                }
                LoopState::Stopping => {}
                LoopState::Initial | LoopState::Stopped => return,
            }
            match lifecycle.task.take() {
                Some(task) => task,
                None => return,
            }
        };

        let mut pending = PendingStop {
            lifecycle: &self.lifecycle,
            task: Some(task),
        };
        let joined = match pending.task.as_mut() {
            Some(task) => task.await,
            None => Ok(()),
        };
        pending.task = None;
        drop(pending);

        if let Err(join_error) = joined {
            error!(error = %join_error, "reconciler task panicked");
        }

        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.state == LoopState::Stopping {
            lifecycle.state = LoopState::Stopped;
            info!("reconciler stopped");
        }
    }

    /// Runs one reconciliation pass.
    ///
    /// Provider queries run concurrently. Subjects without a token or a
    /// provider answer are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first store or task failure. Pairs not yet written are
    /// abandoned for this tick.
    pub async fn tick(&self) -> Result<ReconcileReport, ReconcileError> {
        self.shared.tick().await
    }

    /// Drops the cached subject list so the next tick reads it fresh.
    pub fn invalidate_subjects(&self) {
        self.shared.active.clear();
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        if let Some(cancel) = lock(&self.lifecycle).cancel.take() {
            cancel.cancel();
        }
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("interval", &self.interval)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// Verify Reconciler is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Reconciler>();
};

/// Loop task handle held by an in-progress `stop()`.
///
/// Dropped before the join completes, it hands the handle back to the
/// lifecycle so a later `stop()` or `start()` can finish the transition.
struct PendingStop<'a> {
    lifecycle: &'a Mutex<Lifecycle>,
    task: Option<JoinHandle<()>>,
}

impl Drop for PendingStop<'_> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            lock(self.lifecycle).task = Some(task);
        }
    }
}

fn lock(lifecycle: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run(
    shared: Arc<Shared>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    period: Duration,
    cancel: CancellationToken,
) {
    {
        let mut lifecycle = lock(&lifecycle);
        if lifecycle.state != LoopState::Starting || cancel.is_cancelled() {
            return;
        }
        lifecycle.state = LoopState::Running;
    }
    info!(
        interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
        "reconciler started"
    );

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => match shared.tick().await {
                Ok(report) => debug!(
                    subjects = report.subjects,
                    queried = report.queried,
                    applied = report.applied,
                    skipped = report.skipped,
                    "reconciliation tick complete"
                ),
                Err(error) => warn!(error = %error, "reconciliation tick failed"),
            },
        }
    }
}

impl Shared {
    async fn tick(&self) -> Result<ReconcileReport, ReconcileError> {
        let active = self.active.call(()).await?;
        let mut report = ReconcileReport {
            subjects: active.len(),
            ..ReconcileReport::default()
        };

        let mut queries = JoinSet::new();
        for state in active {
            let Some(token) = self.tokens.token_for(&state.subject_id).await else {
                debug!(subject = %state.subject_id, "no token known, skipping subject");
                report.skipped += 1;
                continue;
            };

            let client = Arc::clone(&self.client);
            queries.spawn(async move {
                let info = client.query_info(&token).await;
                (state.subject_id, info)
            });
            report.queried += 1;
        }

        while let Some(joined) = queries.join_next().await {
            let (subject_id, info) = joined?;
            let Some(info) = info else {
                report.skipped += 1;
                continue;
            };

            if self
                .store
                .apply_remote(&subject_id, RemoteMirror::from(&info))
                .await?
            {
                report.applied += 1;
            } else {
                debug!(subject = %subject_id, "subject removed before mirror write");
            }
        }

        Ok(report)
    }
}
