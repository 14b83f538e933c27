use std::collections::HashMap;
use std::time::Duration;

use kv_watch::WatcherState;
use tokio::time::Instant;

use crate::common::key;
use crate::common::next_change;
use crate::common::setup;
use crate::common::test_config;

#[tokio::test]
async fn test_watcher_follows_store_writes() {
    let (store, watcher, mut updates) = setup(test_config());
    store.put(key("db/host"), "localhost");
    store.put(key("db/port"), "5432");

    watcher.start().await.unwrap();
    let initial = next_change(&mut updates).await;
    assert!(!initial.is_incremental());
    assert_eq!(initial.complete().len(), 2);
    assert_eq!(initial.complete()["db/host"], "localhost");

    store.put(key("db/port"), "6432");
    let update = next_change(&mut updates).await;
    assert_eq!(update.changed()["db/port"], "6432");
    assert!(update.added().is_empty());

    store.put(key("feature/dark-mode"), "on");
    let update = next_change(&mut updates).await;
    assert_eq!(update.added()["feature/dark-mode"], "on");

    store.delete(&key("db/host"));
    let update = next_change(&mut updates).await;
    assert_eq!(update.removed()["db/host"], "localhost");

    let expected: HashMap<String, String> = [
        ("db/port".to_string(), "6432".to_string()),
        ("feature/dark-mode".to_string(), "on".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(*watcher.current_data().unwrap(), expected);
    assert_eq!(watcher.latest_index(), Some(store.index()));

    watcher.stop().await.unwrap();
    assert_eq!(watcher.state(), WatcherState::Terminated);
}

#[tokio::test]
async fn test_blocking_query_wakes_before_interval() {
    let config = test_config().with_watch_interval(Duration::from_secs(3));
    let (store, watcher, mut updates) = setup(config);
    watcher.start().await.unwrap();
    next_change(&mut updates).await;

    let written = Instant::now();
    store.put(key("wake"), "up");
    let update = next_change(&mut updates).await;

    assert_eq!(update.added()["wake"], "up");
    assert!(written.elapsed() < Duration::from_secs(1));
    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn test_sibling_prefix_is_not_watched() {
    let (store, watcher, mut updates) = setup(test_config());
    store.put(key("mine"), "1");
    store.put("my-app/configuration/other", "2");

    watcher.start().await.unwrap();
    let initial = next_change(&mut updates).await;

    assert_eq!(initial.complete().len(), 1);
    assert_eq!(initial.complete()["mine"], "1");
    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn test_folder_marker_and_empty_values() {
    let (store, watcher, mut updates) = setup(test_config());
    store.put_raw(key(""), None);
    store.put_raw(key("flag"), None);
    store.put(key("padded"), "value \n");

    watcher.start().await.unwrap();
    let initial = next_change(&mut updates).await;

    assert_eq!(initial.complete().len(), 2);
    assert_eq!(initial.complete()["flag"], "");
    assert_eq!(initial.complete()["padded"], "value");
    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_returns_while_long_poll_is_pending() {
    let config = test_config().with_watch_interval(Duration::from_millis(500));
    let (_store, watcher, mut updates) = setup(config);
    watcher.start().await.unwrap();
    next_change(&mut updates).await;

    let stopping = Instant::now();
    watcher.stop().await.unwrap();

    // the in-flight query is allowed to run out its wait, no longer
    assert!(stopping.elapsed() < Duration::from_secs(2));
    assert_eq!(watcher.state(), WatcherState::Terminated);
}
