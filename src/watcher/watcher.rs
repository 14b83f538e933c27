//! Poll loop and lifecycle controller.
//!
//! ## One poll cycle
//! 1. Load the current snapshot (mapping and cursor as one pair)
//! 2. List the watched prefix, blocking on the cursor when configured
//! 3. Decode every entry; any failure discards the whole cycle
//! 4. Diff against the mapping loaded in step 1
//! 5. Swap in the new snapshot; the new cursor is always adopted
//! 6. Notify listeners in registration order
//!
//! A single cycle lock serialises cycles from the background loop and from
//! [`KvWatcher::run_once`], so dispatch of cycle N always happens before
//! step 1 of cycle N+1.
//!
//! ## Example
//! ```rust,no_run
//! # async fn demo() -> kv_watch::Result<()> {
//! use std::sync::Arc;
//! use kv_watch::{InMemoryKvStore, KvWatcher, UpdateResult, WatchConfig};
//!
//! let store = Arc::new(InMemoryKvStore::new());
//! let watcher = KvWatcher::new(WatchConfig::new("my-app/config")?, store.clone())?;
//! watcher.add_update_listener(|update: &UpdateResult| {
//!     println!("changed: {:?}", update.changed());
//! });
//! watcher.start().await?;
//! store.put("my-app/config/feature", "on");
//! watcher.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::lifecycle::Lifecycle;
use super::WatcherState;
use crate::compute_update;
use crate::decode_listing;
use crate::metrics;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::Cursor;
use crate::Error;
use crate::FetchError;
use crate::KEY_SEPARATOR;
use crate::KvMap;
use crate::LifecycleError;
use crate::ListenerRegistry;
use crate::Listing;
use crate::ListingClient;
use crate::Result;
use crate::Snapshot;
use crate::SnapshotStore;
use crate::UpdateListener;
use crate::UpdateResult;
use crate::WatchConfig;

/// State shared between the watcher handle and its background poll task.
pub(crate) struct WatchCore<C>
where
    C: ListingClient,
{
    config: WatchConfig,
    list_prefix: String,
    client: C,
    snapshot: SnapshotStore,
    listeners: ListenerRegistry,
    lifecycle: Lifecycle,
    cycle_lock: tokio::sync::Mutex<()>,
}

/// Outcome of one successful cycle.
struct CycleReport {
    result: UpdateResult,
    /// The listing's cursor differs from the one the cycle started with
    cursor_moved: bool,
}

/// Keeps an in-memory snapshot of a remote key prefix in sync and publishes
/// every change to the registered [`UpdateListener`]s.
pub struct KvWatcher<C>
where
    C: ListingClient,
{
    core: Arc<WatchCore<C>>,
    shutdown_tx: watch::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<C> WatchCore<C>
where
    C: ListingClient,
{
    fn root(&self) -> &str {
        &self.config.root_path
    }

    /// Runs steps 1-6 under the cycle lock.
    async fn poll_cycle(&self) -> Result<CycleReport> {
        let _cycle = self.cycle_lock.lock().await;
        self.cycle_locked().await
    }

    /// Steps 1-6; the caller holds the cycle lock.
    #[instrument(level = "debug", skip(self), fields(root = %self.config.root_path))]
    async fn cycle_locked(&self) -> Result<CycleReport> {
        let started = Instant::now();

        let outcome = self.cycle_steps().await;
        match &outcome {
            Ok(report) => metrics::record_success(
                self.root(),
                report.result.complete().len(),
                self.snapshot.latest_index().unwrap_or_default(),
                started.elapsed().as_secs_f64() * 1000.0,
            ),
            Err(e) if e.is_decode() => metrics::record_failure(self.root(), metrics::OUTCOME_DECODE_ERROR),
            Err(_) => metrics::record_failure(self.root(), metrics::OUTCOME_FETCH_ERROR),
        }
        outcome
    }

    async fn cycle_steps(&self) -> Result<CycleReport> {
        let previous = self.snapshot.load();
        let listing = self.fetch(previous.index()).await?;
        let current = decode_listing(self.root(), &listing.entries)?;

        let baseline = self.baseline(&previous, listing.index);
        let result = compute_update(baseline, Arc::new(current));
        self.snapshot
            .replace(Snapshot::new(result.complete_arc(), listing.index));

        debug!(
            index = listing.index,
            keys = result.complete().len(),
            added = result.added().len(),
            changed = result.changed().len(),
            removed = result.removed().len(),
            incremental = result.is_incremental(),
            "snapshot updated"
        );

        let failures = self.listeners.dispatch(&result);
        metrics::record_listener_failures(self.root(), failures);
        Ok(CycleReport {
            result,
            cursor_moved: previous.index() != Some(listing.index),
        })
    }

    async fn fetch(
        &self,
        index: Option<Cursor>,
    ) -> Result<Listing> {
        let deadline = self.config.list_deadline();
        let request = self
            .client
            .list(&self.list_prefix, index, self.config.long_poll_wait());

        match tokio::time::timeout(deadline, request).await {
            Ok(listing) => listing,
            Err(_) => Err(FetchError::Timeout(deadline).into()),
        }
    }

    /// Mapping to diff against. A cursor that went backwards means the store
    /// lost its history, so the new listing is treated as a fresh start.
    fn baseline<'a>(
        &self,
        previous: &'a Snapshot,
        new_index: Cursor,
    ) -> Option<&'a KvMap> {
        match previous.index() {
            Some(seen) if new_index < seen => {
                warn!(
                    root = %self.root(),
                    seen,
                    new_index,
                    "store index went backwards; resynchronizing from scratch"
                );
                None
            }
            _ => previous.data().map(|data| data.as_ref()),
        }
    }

    /// Pause before the next cycle after a successful one.
    ///
    /// A blocking listing that came back early with a new cursor is followed
    /// at once. Any other cycle waits out the rest of `watch_interval`, which
    /// is zero when the listing already blocked for the full wait.
    fn delay_after_success(
        &self,
        elapsed: Duration,
        cursor_moved: bool,
    ) -> Duration {
        if self.config.blocking && cursor_moved {
            Duration::ZERO
        } else {
            self.config.watch_interval().saturating_sub(elapsed)
        }
    }

    async fn run_loop(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<()>,
        initial_delay: Duration,
    ) {
        info!(root = %self.root(), "poll loop started");
        let mut consecutive_failures: u32 = 0;
        let mut delay = initial_delay;

        loop {
            if !delay.is_zero() {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            // Stop requests are honoured between cycles, never inside one.
            if !matches!(shutdown.has_changed(), Ok(false)) {
                break;
            }

            let started = Instant::now();
            delay = match self.poll_cycle().await {
                Ok(report) => {
                    consecutive_failures = 0;
                    self.delay_after_success(started.elapsed(), report.cursor_moved)
                }
                Err(e) => {
                    if self.config.fatal_fetch_errors && e.is_fetch() {
                        error!(root = %self.root(), "poll cycle failed, stopping watcher: {}", e);
                        if let Err(te) = self.lifecycle.transition(WatcherState::Failed) {
                            debug!("watcher already leaving running state: {}", te);
                        }
                        return;
                    }

                    let backoff = self.config.error_backoff.jittered_delay_for(consecutive_failures);
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    error!(
                        root = %self.root(),
                        consecutive_failures,
                        "poll cycle failed, retrying in {:?}: {}",
                        backoff,
                        e
                    );
                    backoff
                }
            };
        }

        info!(root = %self.root(), "poll loop stopped");
    }
}

impl<C> KvWatcher<C>
where
    C: ListingClient,
{
    /// Creates an idle watcher.
    ///
    /// # Errors
    /// [`Error::Config`] when `config` does not validate. A trailing
    /// separator on `root_path` is trimmed first.
    pub fn new(
        config: WatchConfig,
        client: C,
    ) -> Result<Self> {
        let config = config.into_validated()?;
        let (shutdown_tx, _) = watch::channel(());
        Ok(Self {
            core: Arc::new(WatchCore {
                list_prefix: format!("{}{}", config.root_path, KEY_SEPARATOR),
                config,
                client,
                snapshot: SnapshotStore::new(),
                listeners: ListenerRegistry::new(),
                lifecycle: Lifecycle::new(),
                cycle_lock: tokio::sync::Mutex::new(()),
            }),
            shutdown_tx,
            task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &WatchConfig {
        &self.core.config
    }

    pub fn add_update_listener(
        &self,
        listener: impl UpdateListener,
    ) {
        self.add_shared_listener(Arc::new(listener));
    }

    pub fn add_shared_listener(
        &self,
        listener: Arc<dyn UpdateListener>,
    ) {
        self.core.listeners.register(listener);
    }

    /// Mapping of the last successful poll; `None` before the first one.
    pub fn current_data(&self) -> Option<Arc<KvMap>> {
        self.core.snapshot.current_data()
    }

    /// Cursor of the last successful poll; `None` before the first one.
    pub fn latest_index(&self) -> Option<Cursor> {
        self.core.snapshot.latest_index()
    }

    /// Mapping and cursor as one consistent pair.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.core.snapshot.load()
    }

    pub fn state(&self) -> WatcherState {
        self.core.lifecycle.current()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WatcherState> {
        self.core.lifecycle.subscribe()
    }

    /// Waits until the watcher is running.
    ///
    /// # Errors
    /// [`LifecycleError::NotRunning`] if it stops or fails instead.
    pub async fn await_running(&self) -> Result<()> {
        let mut state_rx = self.subscribe_state();
        let state = state_rx
            .wait_for(|state| !matches!(state, WatcherState::Idle | WatcherState::Starting))
            .await
            .map(|state| *state)
            .map_err(|_| LifecycleError::NotRunning(self.state()))?;

        match state {
            WatcherState::Running => Ok(()),
            other => Err(LifecycleError::NotRunning(other).into()),
        }
    }

    /// Runs exactly one poll cycle now and returns once every listener has
    /// been notified. Waits for an in-flight background cycle first, so it
    /// may block for up to the long-poll wait.
    ///
    /// Allowed before `start` and after a failure, but not once the watcher
    /// is stopping or terminated.
    ///
    /// # Errors
    /// [`LifecycleError::NotRunning`] when stopping or terminated. Fetch and
    /// decode failures of this cycle; the snapshot is unchanged.
    pub async fn run_once(&self) -> Result<UpdateResult> {
        let _cycle = self.core.cycle_lock.lock().await;

        let state = self.state();
        if matches!(state, WatcherState::Stopping | WatcherState::Terminated) {
            return Err(LifecycleError::NotRunning(state).into());
        }
        self.core.cycle_locked().await.map(|report| report.result)
    }

    /// Performs the first poll and, once the snapshot is populated, starts
    /// the background poll loop.
    ///
    /// The first poll is retried per [`WatchConfig::startup_retry`], or tried
    /// once with `fail_fast`. If it never succeeds the watcher ends up
    /// [`WatcherState::Failed`].
    pub async fn start(&self) -> Result<()> {
        self.core.lifecycle.transition(WatcherState::Starting)?;
        info!(root = %self.core.root(), "starting watcher");

        let started = Instant::now();
        let first_poll = task_with_timeout_and_exponential_backoff(
            "initial poll",
            || self.core.poll_cycle(),
            self.core.config.effective_startup_retry(),
        )
        .await;

        let report = match first_poll {
            Ok(report) => report,
            Err(e) => {
                error!(root = %self.core.root(), "watcher failed to start: {}", e);
                self.core.lifecycle.transition(WatcherState::Failed)?;
                return Err(e);
            }
        };

        self.core.lifecycle.transition(WatcherState::Running)?;

        let initial_delay = self
            .core
            .delay_after_success(started.elapsed(), report.cursor_moved);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let core = self.core.clone();
        let handle = tokio::spawn(async move { core.run_loop(shutdown_rx, initial_delay).await });
        *self.task.lock() = Some(handle);

        info!(
            root = %self.core.root(),
            index = ?self.latest_index(),
            "watcher running"
        );
        Ok(())
    }

    /// Stops the poll loop, letting an in-flight cycle finish and dispatch.
    ///
    /// Stopping a terminated or failed watcher is a no-op.
    pub async fn stop(&self) -> Result<()> {
        match self.core.lifecycle.transition(WatcherState::Stopping) {
            Ok(_) => {}
            Err(Error::Lifecycle(LifecycleError::InvalidTransition { from, .. })) => {
                if from.is_terminal() {
                    return self.join_task().await;
                }
                return Err(LifecycleError::NotRunning(from).into());
            }
            Err(e) => return Err(e),
        }

        info!(root = %self.core.root(), "stopping watcher");
        let _ = self.shutdown_tx.send(());
        let joined = self.join_task().await;

        self.core.lifecycle.transition(WatcherState::Terminated)?;
        info!(root = %self.core.root(), "watcher terminated");
        joined
    }

    async fn join_task(&self) -> Result<()> {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            handle.await?;
        }
        Ok(())
    }
}

impl<C> Drop for KvWatcher<C>
where
    C: ListingClient,
{
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
