use std::time::Duration;

use kv_watch::Error;
use kv_watch::KvWatcher;
use kv_watch::WatcherState;
use tokio::time::timeout;

use crate::common::key;
use crate::common::next_change;
use crate::common::setup;
use crate::common::test_config;
use crate::common::UPDATE_TIMEOUT;

#[tokio::test]
async fn test_outage_keeps_snapshot_and_recovers() {
    let (store, watcher, mut updates) = setup(test_config());
    store.put(key("a"), "1");
    watcher.start().await.unwrap();
    next_change(&mut updates).await;

    store.fail_next(4);
    store.put(key("b"), "2");

    // readers keep the last good snapshot during the outage
    assert_eq!(watcher.current_data().unwrap()["a"], "1");

    let update = next_change(&mut updates).await;
    assert_eq!(update.added()["b"], "2");
    assert_eq!(watcher.state(), WatcherState::Running);
    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn test_index_reset_triggers_resync() {
    let (store, watcher, mut updates) = setup(test_config());
    store.put(key("a"), "1");
    store.put(key("b"), "2");
    store.put(key("c"), "3");
    watcher.start().await.unwrap();
    next_change(&mut updates).await;
    assert_eq!(watcher.latest_index(), Some(3));

    store.reset_index(1);
    let update = next_change(&mut updates).await;

    assert!(!update.is_incremental());
    assert_eq!(update.complete().len(), 3);
    assert_eq!(watcher.latest_index(), Some(1));

    // watching continues from the adopted index
    store.put(key("d"), "4");
    let update = next_change(&mut updates).await;
    assert!(update.is_incremental());
    assert_eq!(update.added()["d"], "4");
    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_store_fails_start() {
    let (store, watcher, _updates) = setup(test_config());
    store.fail_next(usize::MAX);

    let err = watcher.start().await.unwrap_err();

    assert!(matches!(err, Error::RetryExhausted { attempts: 3, .. }));
    assert_eq!(watcher.state(), WatcherState::Failed);
    assert!(watcher.current_data().is_none());
}

#[tokio::test]
async fn test_fatal_fetch_errors_end_the_watch() {
    let config = test_config().with_fatal_fetch_errors(true);
    let (store, watcher, mut updates) = setup(config);
    watcher.start().await.unwrap();
    next_change(&mut updates).await;

    store.fail_next(1);
    store.put(key("x"), "1");

    let mut state = watcher.subscribe_state();
    timeout(UPDATE_TIMEOUT, state.wait_for(|s| *s == WatcherState::Failed))
        .await
        .expect("watcher did not fail")
        .unwrap();
    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn test_shared_watcher_across_tasks() {
    let (store, watcher, mut updates) = setup(test_config());
    let watcher: std::sync::Arc<KvWatcher<_>> = std::sync::Arc::new(watcher);
    watcher.start().await.unwrap();
    next_change(&mut updates).await;

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let watcher = watcher.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    let snapshot = watcher.snapshot();
                    if let (Some(data), Some(index)) = (snapshot.data(), snapshot.index()) {
                        // every key holds the index of the write that created it
                        for value in data.values() {
                            assert!(value.parse::<u64>().unwrap() <= index);
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        })
        .collect();

    for n in 1..=20u64 {
        store.put(key(&format!("k{n}")), &n.to_string());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    for reader in readers {
        reader.await.unwrap();
    }
    watcher.stop().await.unwrap();
}
