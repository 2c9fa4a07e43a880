//! In-memory prefix tree of the mirrored keyspace.

mod path_tree;
pub use path_tree::*;

#[cfg(test)]
mod path_tree_test;
