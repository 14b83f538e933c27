//! The live (mapping, cursor) pair.
//!
//! A [`Snapshot`] is immutable once built. The [`SnapshotStore`] swaps whole
//! snapshots atomically, so readers on any thread see either the state before
//! a poll cycle or the state after it, never a mapping from one cycle paired
//! with the cursor of another. Reads take no lock.


use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::Cursor;
use crate::KvMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    data: Option<Arc<KvMap>>,
    index: Option<Cursor>,
}

impl Snapshot {
    pub fn new(
        data: Arc<KvMap>,
        index: Cursor,
    ) -> Self {
        Self {
            data: Some(data),
            index: Some(index),
        }
    }

    /// Mapping of the last successful poll, `None` before the first one.
    pub fn data(&self) -> Option<&Arc<KvMap>> {
        self.data.as_ref()
    }

    /// Cursor of the last successful poll, `None` before the first one.
    pub fn index(&self) -> Option<Cursor> {
        self.index
    }

    pub fn is_populated(&self) -> bool {
        self.data.is_some()
    }
}

#[derive(Debug)]
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    /// The current snapshot as a consistent (mapping, cursor) pair.
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn current_data(&self) -> Option<Arc<KvMap>> {
        self.current.load().data.clone()
    }

    pub fn latest_index(&self) -> Option<Cursor> {
        self.current.load().index
    }

    /// Only the poll cycle writes; it holds the cycle lock while doing so.
    pub(crate) fn replace(
        &self,
        snapshot: Snapshot,
    ) -> Arc<Snapshot> {
        self.current.swap(Arc::new(snapshot))
    }
}
