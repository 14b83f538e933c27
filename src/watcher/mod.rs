//! Watcher lifecycle: the first poll, the background poll loop, manual
//! cycles and shutdown.

mod builder;
mod lifecycle;
mod watcher;

pub use builder::*;
pub use lifecycle::WatcherState;
pub use watcher::*;
