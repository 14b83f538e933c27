//! Remote listing abstraction.
//!
//! The watcher consumes the remote key-value store through the single
//! [`ListingClient::list`] operation: list every entry under a prefix,
//! optionally blocking until the store's index moves past a cursor. Transport,
//! retries below the cursor API and authentication belong to implementors.

mod memory;
pub use memory::*;


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Store-assigned, monotonically non-decreasing change index.
pub type Cursor = u64;

/// One raw entry of a listing, exactly as the store reports it.
///
/// Field names follow the Consul KV JSON representation, so HTTP-backed
/// clients can deserialize responses straight into it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KvEntry {
    /// Full key, including the watched prefix
    pub key: String,

    /// Wire-encoded (base64) value; `None` for keys stored without a value
    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub create_index: Cursor,

    #[serde(default)]
    pub modify_index: Cursor,

    #[serde(default)]
    pub flags: u64,
}

impl KvEntry {
    pub fn new(
        key: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            ..Default::default()
        }
    }
}

/// Result of one listing call: the full set of entries under the prefix and
/// the index to block on next time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub entries: Vec<KvEntry>,
    pub index: Cursor,
}

impl Listing {
    pub fn new(
        entries: Vec<KvEntry>,
        index: Cursor,
    ) -> Self {
        Self { entries, index }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ListingClient: Send + Sync + 'static {
    /// Lists every entry whose key starts with `prefix`.
    ///
    /// # Arguments
    /// * `prefix` - Key prefix; the watcher passes its root followed by the
    ///   separator so sibling roots such as `app/config2` are not listed
    /// * `index` - Last cursor seen by the caller; `None` asks for the current
    ///   listing without blocking
    /// * `wait` - Upper bound for a blocking query; ignored when `index` is
    ///   `None`
    ///
    /// # Errors
    /// Implementations report transport and availability problems as
    /// [`crate::FetchError`].
    async fn list(
        &self,
        prefix: &str,
        index: Option<Cursor>,
        wait: Option<Duration>,
    ) -> Result<Listing>;
}

#[async_trait]
impl<C> ListingClient for Arc<C>
where
    C: ListingClient + ?Sized,
{
    async fn list(
        &self,
        prefix: &str,
        index: Option<Cursor>,
        wait: Option<Duration>,
    ) -> Result<Listing> {
        (**self).list(prefix, index, wait).await
    }
}
