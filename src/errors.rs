//! Watch Engine Error Hierarchy
//!
//! Errors are grouped by the stage of a poll cycle that produced them:
//! configuration, fetching the remote listing, decoding it, and driving the
//! watcher lifecycle.

use std::string::FromUtf8Error;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

use crate::WatcherState;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or unloadable watcher configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A listing entry could not be turned into a logical key/value pair
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The remote store could not be listed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Illegal lifecycle operation
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// A retried operation failed on every attempt
    #[error("Gave up after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The listing returned a key outside the watched root; the listing scope is wrong
    #[error("Key {key:?} is not under watched root {root:?}")]
    KeyOutsidePrefix { key: String, root: String },

    #[error("Value of {key:?} is not valid base64")]
    InvalidEncoding {
        key: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Value of {key:?} is not valid UTF-8")]
    InvalidUtf8 {
        key: String,
        #[source]
        source: FromUtf8Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Store reachable but refusing service (HTTP 5xx equivalent)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Listing call exceeded its deadline
    #[error("Listing timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failure with source context
    #[error("Transport failure: {source}")]
    Transport {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Invalid watcher state transition from {from} to {to}")]
    InvalidTransition { from: WatcherState, to: WatcherState },

    #[error("Watcher is not running (state: {0})")]
    NotRunning(WatcherState),
}

impl Error {
    /// Whether the error came from talking to the remote store rather than
    /// from the data it returned.
    pub fn is_fetch(&self) -> bool {
        match self {
            Error::Fetch(_) => true,
            Error::RetryExhausted { source, .. } => source.is_fetch(),
            _ => false,
        }
    }

    pub fn is_decode(&self) -> bool {
        match self {
            Error::Decode(_) => true,
            Error::RetryExhausted { source, .. } => source.is_decode(),
            _ => false,
        }
    }
}
