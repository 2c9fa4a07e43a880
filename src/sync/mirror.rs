//! The mirrored keyspace: tree plus revision behind one critical section.
//!
//! Every operation locks once and never across an await point, so readers
//! observe either none or all of an applied change. Changes are handed to the
//! broker inside the same critical section: publish order is apply order, no
//! matter which task produced the change.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::Change;
use crate::ChangeEvent;
use crate::EventBroker;
use crate::KeyValue;
use crate::Node;

#[derive(Debug, Default)]
struct MirrorState {
    root: Node,
    rev: i64,
}

/// One direct child in a subtree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildEntry {
    pub segment: String,
    #[serde(rename = "hasValue")]
    pub has_value: bool,
    #[serde(rename = "hasChildren")]
    pub has_children: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubtreeListing {
    pub revision: i64,
    pub entries: Vec<ChildEntry>,
}

#[derive(Debug, Default)]
pub struct Mirror {
    state: Mutex<MirrorState>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest revision applied so far.
    pub fn revision(&self) -> i64 {
        self.state.lock().rev
    }

    /// Replaces the whole tree with a full load served at `revision`.
    ///
    /// The recorded revision is the larger of `revision` and every entry's
    /// modification revision.
    pub fn load_snapshot(
        &self,
        revision: i64,
        entries: &[KeyValue],
    ) -> i64 {
        let mut root = Node::new("");
        let mut rev = revision;
        for kv in entries {
            root.add_node(&kv.key, kv.lease_id);
            rev = rev.max(kv.mod_revision);
        }

        let mut state = self.state.lock();
        state.root = root;
        state.rev = state.rev.max(rev);
        state.rev
    }

    /// Applies one change and publishes it. Returns false, publishing
    /// nothing, if the event is older than what has already been applied.
    pub fn apply(
        &self,
        event: ChangeEvent,
        broker: &EventBroker,
    ) -> bool {
        let mut state = self.state.lock();
        if event.rev < state.rev {
            trace!(key = %event.key, rev = event.rev, current = state.rev, "Stale change skipped");
            return false;
        }
        match &event.change {
            Change::Put { lease_id, .. } => {
                state.root.add_node(&event.key, *lease_id);
            }
            Change::Delete => state.root.delete_node(&event.key),
        }
        state.rev = event.rev;
        broker.publish(event);
        true
    }

    /// Direct children of `prefix`, sorted by segment.
    ///
    /// An absent prefix yields an empty listing at the current revision.
    pub fn list_subtree(
        &self,
        prefix: &str,
    ) -> SubtreeListing {
        let state = self.state.lock();
        let mut entries: Vec<ChildEntry> = state
            .root
            .get_node(prefix)
            .map(|node| {
                node.children()
                    .map(|(segment, child)| ChildEntry {
                        segment: segment.to_string(),
                        has_value: child.has_value(),
                        has_children: child.count() > 0,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let revision = state.rev;
        drop(state);

        entries.sort_by(|a, b| a.segment.cmp(&b.segment));
        SubtreeListing { revision, entries }
    }

    /// Whether `key` currently exists upstream.
    pub fn contains(
        &self,
        key: &str,
    ) -> bool {
        self.state.lock().root.get_node(key).is_some_and(Node::has_value)
    }

    pub fn leased_keys(&self) -> Vec<(String, i64)> {
        self.state.lock().root.leased_keys()
    }

    /// Removes every subtree bound to a lease that `memo` reports expired and
    /// publishes a delete for each removed key at the current revision.
    ///
    /// Leases missing from `memo` are kept. Returns the removed keys.
    pub fn remove_expired(
        &self,
        memo: &HashMap<i64, bool>,
        broker: &EventBroker,
    ) -> Vec<String> {
        let mut state = self.state.lock();
        let removed = state
            .root
            .sweep_leases(|lease_id| memo.get(&lease_id).copied().unwrap_or(false));
        for key in &removed {
            broker.publish(ChangeEvent::delete(key.as_str(), state.rev));
        }
        removed
    }
}
