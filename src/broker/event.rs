use bytes::Bytes;

use crate::WatchEvent;
use crate::WatchEventKind;

/// What happened to a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Key was inserted or updated
    Put {
        value: Bytes,
        lease_id: Option<i64>,
    },
    /// Key was deleted upstream or swept after its lease expired
    Delete,
}

/// A single mutation of the mirrored keyspace, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub key: String,
    pub change: Change,
    pub rev: i64,
}

impl ChangeEvent {
    pub fn put(
        key: impl Into<String>,
        value: impl Into<Bytes>,
        rev: i64,
        lease_id: Option<i64>,
    ) -> Self {
        Self {
            key: key.into(),
            change: Change::Put {
                value: value.into(),
                lease_id,
            },
            rev,
        }
    }

    pub fn delete(
        key: impl Into<String>,
        rev: i64,
    ) -> Self {
        Self {
            key: key.into(),
            change: Change::Delete,
            rev,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.change, Change::Delete)
    }

    /// The new value, `None` for deletions.
    pub fn value(&self) -> Option<&Bytes> {
        match &self.change {
            Change::Put { value, .. } => Some(value),
            Change::Delete => None,
        }
    }
}

impl From<WatchEvent> for ChangeEvent {
    fn from(event: WatchEvent) -> Self {
        let kv = event.kv;
        match event.kind {
            WatchEventKind::Put => ChangeEvent::put(kv.key, kv.value, kv.mod_revision, kv.lease_id),
            WatchEventKind::Delete => ChangeEvent::delete(kv.key, kv.mod_revision),
        }
    }
}
