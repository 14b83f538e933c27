//! Fluent assembly of a [`KvWatcher`].
//!
//! ## Example
//! ```rust,no_run
//! # fn demo() -> kv_watch::Result<()> {
//! use std::sync::Arc;
//! use kv_watch::{InMemoryKvStore, UpdateResult, WatchConfig, WatcherBuilder};
//!
//! let watcher = WatcherBuilder::new(WatchConfig::load(None)?)
//!     .client(Arc::new(InMemoryKvStore::new()))
//!     .listener(|update: &UpdateResult| println!("{} keys", update.complete().len()))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use config::ConfigError;

use super::KvWatcher;
use crate::Error;
use crate::ListingClient;
use crate::Result;
use crate::UpdateListener;
use crate::WatchConfig;

pub struct WatcherBuilder<C>
where
    C: ListingClient,
{
    config: WatchConfig,
    client: Option<C>,
    listeners: Vec<Arc<dyn UpdateListener>>,
}

impl<C> WatcherBuilder<C>
where
    C: ListingClient,
{
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            client: None,
            listeners: Vec::new(),
        }
    }

    pub fn client(
        mut self,
        client: C,
    ) -> Self {
        self.client = Some(client);
        self
    }

    /// Listeners are notified in the order they are added here.
    pub fn listener(
        self,
        listener: impl UpdateListener,
    ) -> Self {
        self.shared_listener(Arc::new(listener))
    }

    pub fn shared_listener(
        mut self,
        listener: Arc<dyn UpdateListener>,
    ) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Normalises and validates the configuration, then assembles an idle
    /// watcher.
    pub fn build(self) -> Result<KvWatcher<C>> {
        let client = self.client.ok_or_else(|| {
            Error::Config(ConfigError::Message(
                "a listing client is required to build a watcher".into(),
            ))
        })?;

        let watcher = KvWatcher::new(self.config, client)?;
        for listener in self.listeners {
            watcher.add_shared_listener(listener);
        }
        Ok(watcher)
    }
}
