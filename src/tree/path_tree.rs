//! Prefix tree mirroring the presence of keys in the remote keyspace.
//!
//! For space reasons no values are stored, only the fact that a key exists
//! and the lease it is bound to. Keys are split into segments that keep their
//! trailing separator, so `"a/b"` and `"/a/b"` live under different edges.
//!
//! Not thread-safe: the owner serialises writers and readers.

use std::collections::HashMap;

pub const SEPARATOR: u8 = b'/';

/// A single node of the tree.
///
/// A node without value and without children is garbage and is never left
/// reachable: deletions prune such nodes together with their dead ancestors.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Node {
    segment: String,
    children: Option<HashMap<String, Node>>,
    has_value: bool,
    lease_id: Option<i64>,
}

/// Splits a key into segments.
///
/// Leading separators stick to the first segment. After that a run of
/// separators closes the current segment, so `"a//b"` yields `["a//", "b"]`.
/// Empty tokens are never produced and an empty key yields no segments.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() && bytes[i] == SEPARATOR {
        i += 1;
    }
    while i < bytes.len() {
        if bytes[i] != SEPARATOR {
            i += 1;
            continue;
        }
        while i < bytes.len() && bytes[i] == SEPARATOR {
            i += 1;
        }
        segments.push(&path[start..i]);
        start = i;
    }
    if start < path.len() {
        segments.push(&path[start..]);
    }
    segments
}

/// True iff `path` lies strictly below `ancestor` in the tree.
///
/// Ancestry follows segments, not bytes: `"a//b"` is not below `"a/"`.
pub fn is_descendant(
    path: &str,
    ancestor: &str,
) -> bool {
    let path = split_path(path);
    let ancestor = split_path(ancestor);
    ancestor.len() < path.len() && path.starts_with(&ancestor)
}

fn normalize_lease(lease_id: Option<i64>) -> Option<i64> {
    lease_id.filter(|id| *id > 0)
}

impl Node {
    pub fn new(segment: &str) -> Self {
        Node {
            segment: segment.to_string(),
            ..Default::default()
        }
    }

    /// The path component this node represents; empty for the root.
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// True iff a key terminating exactly at this node exists.
    pub fn has_value(&self) -> bool {
        self.has_value
    }

    pub fn lease_id(&self) -> Option<i64> {
        self.lease_id
    }

    /// Number of sub-nodes.
    pub fn count(&self) -> usize {
        self.children.as_ref().map_or(0, HashMap::len)
    }

    /// Read-only view of the sub-nodes, in no particular order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children
            .iter()
            .flat_map(|c| c.iter())
            .map(|(segment, node)| (segment.as_str(), node))
    }

    fn child(
        &self,
        segment: &str,
    ) -> Option<&Node> {
        self.children.as_ref()?.get(segment)
    }

    fn child_mut(
        &mut self,
        segment: &str,
    ) -> Option<&mut Node> {
        self.children.as_mut()?.get_mut(segment)
    }

    fn remove_child(
        &mut self,
        segment: &str,
    ) -> Option<Node> {
        let children = self.children.as_mut()?;
        let removed = children.remove(segment);
        if children.is_empty() {
            // invariant: no children = no map
            self.children = None;
        }
        removed
    }

    /// Retrieves a node by path.
    pub fn get_node(
        &self,
        path: &str,
    ) -> Option<&Node> {
        split_path(path)
            .into_iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Marks `path` as holding a value, creating missing intermediate nodes.
    ///
    /// Re-adding an existing key only refreshes its lease binding; a put
    /// without lease detaches any previous one.
    pub fn add_node(
        &mut self,
        path: &str,
        lease_id: Option<i64>,
    ) -> &Node {
        let mut node = self;
        for segment in split_path(path) {
            node = node
                .children
                .get_or_insert_with(HashMap::new)
                .entry(segment.to_string())
                .or_insert_with(|| Node::new(segment));
        }
        node.has_value = true;
        node.lease_id = normalize_lease(lease_id);
        node
    }

    /// Finds where a dead chain ending at `segments` should be cut.
    ///
    /// Returns the index of the shallowest segment whose removal detaches the
    /// whole chain, or `None` if the path does not resolve. Every node on the
    /// chain below the cut has no value and no other child.
    fn cut_point(
        &self,
        segments: &[&str],
    ) -> Option<usize> {
        let last = segments.len().checked_sub(1)?;
        let mut cut = None;
        let mut node = self;
        for (depth, segment) in segments.iter().enumerate() {
            node = node.child(segment)?;
            if depth == last {
                break;
            }
            if node.has_value || node.count() > 1 {
                cut = None;
            } else if cut.is_none() {
                cut = Some(depth);
            }
        }
        Some(cut.unwrap_or(last))
    }

    /// Detaches the subtree hanging at `segments[cut]`.
    fn detach(
        &mut self,
        segments: &[&str],
        cut: usize,
    ) -> Option<Node> {
        let mut parent = self;
        for segment in &segments[..cut] {
            parent = parent.child_mut(segment)?;
        }
        parent.remove_child(segments[cut])
    }

    /// Removes the value marker of `path` and prunes what is no longer needed.
    ///
    /// The dead suffix of the path is detached in one step at the deepest
    /// still-needed ancestor. A path that does not fully resolve is a no-op.
    pub fn delete_node(
        &mut self,
        path: &str,
    ) {
        let segments = split_path(path);
        if segments.is_empty() {
            self.has_value = false;
            self.lease_id = None;
            return;
        }
        let Some(cut) = self.cut_point(&segments) else {
            return;
        };
        let target_has_children = self.get_node(path).is_some_and(|n| n.count() > 0);
        if target_has_children {
            if let Some(target) = self.get_node_mut(&segments) {
                target.has_value = false;
                target.lease_id = None;
            }
            return;
        }
        self.detach(&segments, cut);
    }

    fn get_node_mut(
        &mut self,
        segments: &[&str],
    ) -> Option<&mut Node> {
        let mut node = self;
        for segment in segments {
            node = node.child_mut(segment)?;
        }
        Some(node)
    }

    /// Appends the full key of every live node at or below `self`.
    ///
    /// `prefix` must be the full path of `self`; it is restored on return.
    pub(crate) fn collect_keys(
        &self,
        prefix: &mut String,
        out: &mut Vec<String>,
    ) {
        if self.has_value {
            out.push(prefix.clone());
        }
        for (segment, child) in self.children() {
            let len = prefix.len();
            prefix.push_str(segment);
            child.collect_keys(prefix, out);
            prefix.truncate(len);
        }
    }

    /// Every `(key, lease_id)` pair in the tree, for nodes carrying a lease.
    ///
    /// A node is listed before anything below it.
    pub fn leased_keys(&self) -> Vec<(String, i64)> {
        let mut out = Vec::new();
        self.collect_leases(&mut String::new(), &mut out);
        out
    }

    fn collect_leases(
        &self,
        prefix: &mut String,
        out: &mut Vec<(String, i64)>,
    ) {
        if let Some(lease_id) = self.lease_id {
            out.push((prefix.clone(), lease_id));
        }
        for (segment, child) in self.children() {
            let len = prefix.len();
            prefix.push_str(segment);
            child.collect_leases(prefix, out);
            prefix.truncate(len);
        }
    }

    /// Removes every subtree whose root carries a lease for which `expired`
    /// answers true, without descending into removed subtrees.
    ///
    /// Ancestors left without value or children are pruned on the way back
    /// up. Returns the live keys that were removed.
    pub fn sweep_leases<F>(
        &mut self,
        mut expired: F,
    ) -> Vec<String>
    where
        F: FnMut(i64) -> bool,
    {
        let mut removed = Vec::new();
        if self.lease_id.is_some_and(&mut expired) {
            self.collect_keys(&mut String::new(), &mut removed);
            *self = Node::new("");
            return removed;
        }
        self.sweep_children(&mut String::new(), &mut expired, &mut removed);
        removed
    }

    fn sweep_children<F>(
        &mut self,
        prefix: &mut String,
        expired: &mut F,
        removed: &mut Vec<String>,
    ) where
        F: FnMut(i64) -> bool,
    {
        let Some(children) = self.children.as_mut() else {
            return;
        };
        children.retain(|segment, child| {
            let len = prefix.len();
            prefix.push_str(segment);
            let keep = if child.lease_id.is_some_and(&mut *expired) {
                child.collect_keys(prefix, removed);
                false
            } else {
                child.sweep_children(prefix, expired, removed);
                child.has_value || child.count() > 0
            };
            prefix.truncate(len);
            keep
        });
        if children.is_empty() {
            self.children = None;
        }
    }
}
