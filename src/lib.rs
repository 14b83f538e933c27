//! Keeps an in-process copy of a remote key-value prefix in sync.
//!
//! A [`KvWatcher`] long-polls a [`ListingClient`] for every key under a root
//! path, decodes the store's base64 values, strips the root from the keys,
//! and publishes the resulting mapping as an atomically swapped
//! [`Snapshot`]. Each successful poll cycle also yields an [`UpdateResult`]
//! describing which keys were added, changed or removed; it is handed to the
//! registered [`UpdateListener`]s in registration order.

mod client;
mod config;
mod decode;
mod diff;
mod errors;
mod listener;
mod snapshot;
mod watcher;
pub mod metrics;
pub(crate) mod utils;

pub use client::*;
pub use config::*;
pub use decode::*;
pub use diff::*;
pub use errors::*;
pub use listener::*;
pub use snapshot::*;
pub use watcher::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
