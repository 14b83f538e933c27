use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;

use super::Cursor;
use super::KvEntry;
use super::Listing;
use super::ListingClient;
use crate::encode_value;
use crate::FetchError;
use crate::Result;

/// Process-local key-value store with blocking-query semantics.
///
/// Every write bumps a single store-wide index. Values are kept in their wire
/// (base64) form, so listings look exactly like those of a remote store.
/// Useful for embedding and for exercising a watcher without a network.
#[derive(Debug)]
pub struct InMemoryKvStore {
    entries: RwLock<BTreeMap<String, KvEntry>>,
    index_tx: watch::Sender<Cursor>,
    pending_failures: AtomicUsize,
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        let (index_tx, _) = watch::channel(0);
        Self {
            entries: RwLock::new(BTreeMap::new()),
            index_tx,
            pending_failures: AtomicUsize::new(0),
        }
    }

    /// Current store-wide index.
    pub fn index(&self) -> Cursor {
        *self.index_tx.borrow()
    }

    /// Stores `value` under `key`, returning the new store index.
    pub fn put(
        &self,
        key: impl Into<String>,
        value: &str,
    ) -> Cursor {
        self.put_raw(key, Some(encode_value(value)))
    }

    /// Stores an already wire-encoded value, bypassing the encoder.
    pub fn put_raw(
        &self,
        key: impl Into<String>,
        raw_value: Option<String>,
    ) -> Cursor {
        let key = key.into();
        let mut entries = self.entries.write();
        let index = self.index() + 1;

        let entry = entries.entry(key.clone()).or_insert_with(|| KvEntry {
            key: key.clone(),
            create_index: index,
            ..Default::default()
        });
        entry.value = raw_value;
        entry.modify_index = index;

        trace!(key = %key, index, "put");
        self.publish(index);
        index
    }

    /// Removes `key`, returning the new store index if it existed.
    pub fn delete(
        &self,
        key: &str,
    ) -> Option<Cursor> {
        let mut entries = self.entries.write();
        entries.remove(key)?;
        let index = self.index() + 1;

        trace!(key = %key, index, "delete");
        self.publish(index);
        Some(index)
    }

    /// Removes every key starting with `prefix`, returning the number removed.
    pub fn delete_prefix(
        &self,
        prefix: &str,
    ) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();

        if removed > 0 {
            let index = self.index() + 1;
            self.publish(index);
        }
        removed
    }

    /// Sets the store index to `index` without touching the data, as a store
    /// does after a snapshot restore. Wakes every blocked listing.
    pub fn reset_index(
        &self,
        index: Cursor,
    ) {
        let _entries = self.entries.write();
        debug!(index, "store index reset");
        self.publish(index);
    }

    /// Makes the next `count` listing calls fail with [`FetchError::Unavailable`].
    pub fn fail_next(
        &self,
        count: usize,
    ) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    fn publish(
        &self,
        index: Cursor,
    ) {
        self.index_tx.send_replace(index);
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn snapshot(
        &self,
        prefix: &str,
    ) -> Listing {
        let entries = self.entries.read();
        let listed = entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, entry)| entry.clone())
            .collect();

        Listing::new(listed, self.index())
    }
}

#[async_trait]
impl ListingClient for InMemoryKvStore {
    async fn list(
        &self,
        prefix: &str,
        index: Option<Cursor>,
        wait: Option<Duration>,
    ) -> Result<Listing> {
        if self.take_failure() {
            return Err(FetchError::Unavailable("injected failure".into()).into());
        }

        if let (Some(seen), Some(wait)) = (index, wait) {
            let mut index_rx = self.index_tx.subscribe();
            // Timing out just means nothing changed; the unchanged listing is returned.
            let _ = tokio::time::timeout(wait, index_rx.wait_for(|current| *current != seen)).await;
        }

        Ok(self.snapshot(prefix))
    }
}
