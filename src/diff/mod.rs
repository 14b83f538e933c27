//! Semantic difference between two logical mappings.
//!
//! One [`UpdateResult`] is produced per successful poll cycle and handed to
//! every listener. `added`, `changed` and `removed` are pairwise disjoint;
//! keys whose value did not move only show up in `complete`.


use std::sync::Arc;

use crate::KvMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    complete: Arc<KvMap>,
    added: KvMap,
    changed: KvMap,
    removed: KvMap,
    incremental: bool,
}

impl UpdateResult {
    /// A non-incremental result carrying only the full state.
    ///
    /// All three deltas are empty, so `complete` cannot be derived from the
    /// previous result plus `added` minus `removed` here. Listeners must read
    /// `complete` whenever `is_incremental()` is `false`: on the first cycle
    /// and after a resynchronisation.
    pub fn full(complete: Arc<KvMap>) -> Self {
        Self {
            complete,
            added: KvMap::new(),
            changed: KvMap::new(),
            removed: KvMap::new(),
            incremental: false,
        }
    }

    /// The whole mapping after this cycle.
    pub fn complete(&self) -> &KvMap {
        &self.complete
    }

    pub(crate) fn complete_arc(&self) -> Arc<KvMap> {
        self.complete.clone()
    }

    /// Keys that did not exist before, with their new values.
    pub fn added(&self) -> &KvMap {
        &self.added
    }

    /// Keys present before and now with a different value, with their new values.
    pub fn changed(&self) -> &KvMap {
        &self.changed
    }

    /// Keys that no longer exist, with their last known values.
    pub fn removed(&self) -> &KvMap {
        &self.removed
    }

    /// `false` exactly when there was no previous mapping to compare against.
    pub fn is_incremental(&self) -> bool {
        self.incremental
    }

    /// Whether any of the delta maps is non-empty.
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty())
    }
}

/// Compares `current` against `previous`.
///
/// With no previous mapping the result is a full, non-incremental update.
/// Otherwise it is incremental, even when nothing changed.
pub fn compute_update(
    previous: Option<&KvMap>,
    current: Arc<KvMap>,
) -> UpdateResult {
    let Some(previous) = previous else {
        return UpdateResult::full(current);
    };

    let mut added = KvMap::new();
    let mut changed = KvMap::new();
    for (key, value) in current.iter() {
        match previous.get(key) {
            None => {
                added.insert(key.clone(), value.clone());
            }
            Some(old) if old != value => {
                changed.insert(key.clone(), value.clone());
            }
            Some(_) => {}
        }
    }

    let removed = previous
        .iter()
        .filter(|(key, _)| !current.contains_key(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    UpdateResult {
        complete: current,
        added,
        changed,
        removed,
        incremental: true,
    }
}
