//! Contract with the remote hierarchical key-value store.
//!
//! The store is consumed as a given: watchable, revisioned, prefix-queryable,
//! with optional per-key leases. [`RemoteStore`] is the seam the sync engine,
//! the lease sweeper and the produced API talk through; [`EtcdStore`] is the
//! production implementation.

mod etcd;
pub use etcd::*;

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::RemoteError;

/// One key as returned by a range query or carried by a watch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Bytes,
    pub mod_revision: i64,
    /// `None` when the key is not bound to a lease
    pub lease_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeResponse {
    /// Store revision at which the range was served
    pub revision: i64,
    pub entries: Vec<KeyValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub kv: KeyValue,
}

/// One batch of changes delivered by a watch stream, in revision order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchResponse {
    pub events: Vec<WatchEvent>,
}

/// Revision-ordered change stream. A compaction is reported as
/// [`RemoteError::Compacted`] and ends the stream.
pub type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchResponse, RemoteError>> + Send>>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Reads one key, or every key under `key` when `with_prefix` is set.
    async fn get(
        &self,
        key: &str,
        with_prefix: bool,
    ) -> Result<RangeResponse, RemoteError>;

    /// Subscribes to every change under `prefix` starting at `start_revision`.
    async fn watch(
        &self,
        prefix: &str,
        start_revision: i64,
    ) -> Result<WatchStream, RemoteError>;

    /// Writes a key and returns the revision of the write.
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        lease_id: Option<i64>,
    ) -> Result<i64, RemoteError>;

    /// Deletes a key and returns the revision of the delete.
    async fn delete(
        &self,
        key: &str,
    ) -> Result<i64, RemoteError>;

    /// Remaining time-to-live of a lease in seconds; negative once expired.
    async fn lease_time_to_live(
        &self,
        lease_id: i64,
    ) -> Result<i64, RemoteError>;
}
