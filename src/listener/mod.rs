//! Listener contract and registry.
//!
//! Listeners are invoked synchronously, in registration order, once per
//! successful poll cycle. A listener that panics is logged and counted; the
//! remaining listeners are still notified and the already committed snapshot
//! is untouched.


use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;
use tracing::trace;

use crate::UpdateResult;

/// Observer of snapshot updates.
pub trait UpdateListener: Send + Sync + 'static {
    fn on_update(
        &self,
        result: &UpdateResult,
    );
}

impl<F> UpdateListener for F
where
    F: Fn(&UpdateResult) + Send + Sync + 'static,
{
    fn on_update(
        &self,
        result: &UpdateResult,
    ) {
        (self)(result)
    }
}

/// Append-only, ordered set of listeners. Registering the same listener
/// twice makes it receive every update twice.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn UpdateListener>>>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        listener: Arc<dyn UpdateListener>,
    ) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notifies every listener in registration order and returns how many
    /// of them panicked.
    ///
    /// The listener list is copied first, so a listener may register further
    /// listeners without deadlocking; those are notified from the next update.
    pub fn dispatch(
        &self,
        result: &UpdateResult,
    ) -> usize {
        let listeners: Vec<Arc<dyn UpdateListener>> = self.listeners.read().clone();
        let mut failures = 0;

        for (position, listener) in listeners.iter().enumerate() {
            trace!(position, "notifying listener");
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener.on_update(result))) {
                failures += 1;
                error!(
                    position,
                    reason = panic_message(panic.as_ref()),
                    "listener failed while handling update"
                );
            }
        }

        failures
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
