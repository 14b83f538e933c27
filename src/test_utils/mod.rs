//! Shared fixtures for unit tests: random listings in the store's wire
//! format and a listener that records what it is told.
mod common;
mod listener;

pub use common::*;
pub use listener::*;
