use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

use crate::ApiConfig;
use crate::Error;
use crate::EventBroker;
use crate::Forwarder;
use crate::Mirror;
use crate::RemoteStore;
use crate::Result;
use crate::SubtreeListing;
use crate::UpdateSink;

/// The interface the mirror offers to a transport layer.
///
/// Listings are served from the mirror. Point reads and mutations go to the
/// remote store; a mutation becomes visible in the mirror only once its watch
/// event arrives.
pub struct MirrorService<R: RemoteStore> {
    store: Arc<R>,
    mirror: Arc<Mirror>,
    broker: EventBroker,
    config: ApiConfig,
}

impl<R: RemoteStore> Clone for MirrorService<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            mirror: self.mirror.clone(),
            broker: self.broker.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R: RemoteStore> MirrorService<R> {
    pub fn new(
        store: Arc<R>,
        mirror: Arc<Mirror>,
        broker: EventBroker,
        config: ApiConfig,
    ) -> Self {
        Self {
            store,
            mirror,
            broker,
            config,
        }
    }

    pub fn is_editable(&self) -> bool {
        self.config.editable
    }

    /// Raw value of one key.
    pub async fn get_value(
        &self,
        key: &str,
    ) -> Result<Bytes> {
        let response = self.store.get(key, false).await.map_err(|e| {
            warn!(key, "Get failed: {}", e);
            Error::from(e)
        })?;
        response
            .entries
            .into_iter()
            .next()
            .map(|kv| kv.value)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    pub fn list_subtree(
        &self,
        prefix: &str,
    ) -> SubtreeListing {
        self.mirror.list_subtree(prefix)
    }

    /// Writes `key` upstream and returns the revision of the write.
    pub async fn put_value(
        &self,
        key: &str,
        value: Bytes,
    ) -> Result<i64> {
        self.ensure_writable(key)?;
        let rev = self.store.put(key, value, None).await.map_err(|e| {
            warn!(key, "Put failed: {}", e);
            Error::from(e)
        })?;
        debug!(key, rev, "Put forwarded");
        Ok(rev)
    }

    /// Deletes `key` upstream and returns the revision of the delete.
    pub async fn delete_value(
        &self,
        key: &str,
    ) -> Result<i64> {
        self.ensure_writable(key)?;
        let rev = self.store.delete(key).await.map_err(|e| {
            warn!(key, "Delete failed: {}", e);
            Error::from(e)
        })?;
        debug!(key, rev, "Delete forwarded");
        Ok(rev)
    }

    /// Registers a live subscription writing to `sink`.
    ///
    /// The returned forwarder must be driven with [`Forwarder::run`].
    pub fn subscribe<S: UpdateSink>(
        &self,
        sink: S,
        client: mpsc::Receiver<Bytes>,
    ) -> Forwarder<S> {
        Forwarder::new(self.broker.subscribe(), sink, client, self.config.clone())
    }

    fn ensure_writable(
        &self,
        key: &str,
    ) -> Result<()> {
        if !self.config.editable {
            return Err(Error::Forbidden);
        }
        if key.is_empty() {
            return Err(Error::BadRequest("key must not be empty".into()));
        }
        Ok(())
    }
}
