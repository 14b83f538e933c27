use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::UpdateListener;
use crate::UpdateResult;

/// Listener that keeps every result it receives.
#[derive(Debug, Default)]
pub(crate) struct RecordingListener {
    results: Mutex<Vec<UpdateResult>>,
    events: AtomicUsize,
}

impl RecordingListener {
    pub(crate) fn events(&self) -> usize {
        self.events.load(Ordering::SeqCst)
    }

    pub(crate) fn result(
        &self,
        n: usize,
    ) -> UpdateResult {
        self.results.lock()[n].clone()
    }

    pub(crate) fn last(&self) -> Option<UpdateResult> {
        self.results.lock().last().cloned()
    }
}

impl UpdateListener for RecordingListener {
    fn on_update(
        &self,
        result: &UpdateResult,
    ) {
        self.results.lock().push(result.clone());
        self.events.fetch_add(1, Ordering::SeqCst);
    }
}
