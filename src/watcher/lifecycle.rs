use std::fmt;

use tokio::sync::watch;
use tracing::debug;

use crate::LifecycleError;
use crate::Result;

/// Lifecycle of a [`crate::KvWatcher`].
///
/// ```text
/// Idle -> Starting -> Running -> Stopping -> Terminated
///             |          |
///             +-> Failed <+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherState {
    /// Constructed; no poll loop yet
    Idle,
    /// Performing the first poll
    Starting,
    /// Background poll loop active
    Running,
    /// No new cycles; the in-flight one may still finish
    Stopping,
    /// Poll loop gone after a requested stop
    Terminated,
    /// Poll loop gone after an unrecoverable error
    Failed,
}

impl WatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatcherState::Idle => "idle",
            WatcherState::Starting => "starting",
            WatcherState::Running => "running",
            WatcherState::Stopping => "stopping",
            WatcherState::Terminated => "terminated",
            WatcherState::Failed => "failed",
        }
    }

    pub fn can_transition_to(
        &self,
        next: WatcherState,
    ) -> bool {
        use WatcherState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Terminated)
        )
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WatcherState::Terminated | WatcherState::Failed)
    }
}

impl fmt::Display for WatcherState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state, published to any number of observers.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state_tx: watch::Sender<WatcherState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (state_tx, _) = watch::channel(WatcherState::Idle);
        Self { state_tx }
    }

    pub(crate) fn current(&self) -> WatcherState {
        *self.state_tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<WatcherState> {
        self.state_tx.subscribe()
    }

    /// Atomically moves to `next`, returning the state it left.
    pub(crate) fn transition(
        &self,
        next: WatcherState,
    ) -> Result<WatcherState> {
        let mut outcome = Ok(next);
        self.state_tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                outcome = Ok(*state);
                *state = next;
                true
            } else {
                outcome = Err(LifecycleError::InvalidTransition {
                    from: *state,
                    to: next,
                });
                false
            }
        });

        let previous = outcome?;
        debug!(from = %previous, to = %next, "watcher state changed");
        Ok(previous)
    }
}
