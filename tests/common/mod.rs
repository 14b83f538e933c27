use std::sync::Arc;
use std::time::Duration;

use kv_watch::BackoffPolicy;
use kv_watch::InMemoryKvStore;
use kv_watch::KvWatcher;
use kv_watch::UpdateResult;
use kv_watch::WatchConfig;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const ROOT: &str = "my-app/config";

// generous upper bound for a single update to arrive
pub const UPDATE_TIMEOUT: Duration = Duration::from_secs(5);

pub type StoreWatcher = KvWatcher<Arc<InMemoryKvStore>>;

pub fn key(relative: &str) -> String {
    format!("{ROOT}/{relative}")
}

pub fn test_config() -> WatchConfig {
    WatchConfig::new(ROOT)
        .expect("valid root")
        .with_watch_interval(Duration::from_millis(200))
        .with_startup_retry(BackoffPolicy {
            max_retries: 3,
            timeout_ms: 0,
            base_delay_ms: 10,
            max_delay_ms: 50,
        })
        .with_error_backoff(BackoffPolicy {
            max_retries: 0,
            timeout_ms: 0,
            base_delay_ms: 10,
            max_delay_ms: 50,
        })
}

/// A watcher over a fresh in-memory store, plus a channel receiving every
/// update it publishes.
pub fn setup(config: WatchConfig) -> (Arc<InMemoryKvStore>, StoreWatcher, mpsc::UnboundedReceiver<UpdateResult>) {
    let store = Arc::new(InMemoryKvStore::new());
    let watcher = KvWatcher::new(config, store.clone()).expect("valid config");

    let (tx, rx) = mpsc::unbounded_channel();
    watcher.add_update_listener(move |result: &UpdateResult| {
        let _ = tx.send(result.clone());
    });
    (store, watcher, rx)
}

/// Waits for the next update that actually changes something.
pub async fn next_change(updates: &mut mpsc::UnboundedReceiver<UpdateResult>) -> UpdateResult {
    timeout(UPDATE_TIMEOUT, async {
        loop {
            let update = updates.recv().await.expect("watcher dropped its listener");
            if update.has_changes() || !update.is_incremental() {
                return update;
            }
        }
    })
    .await
    .expect("no update within timeout")
}
