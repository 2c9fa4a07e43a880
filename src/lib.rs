//! Live, queryable in-process mirror of a remote etcd v3 keyspace.
//!
//! ```text
//! remote store ──► SyncEngine ──► Mirror (PathTree + revision)
//!                      │
//!                      └──► EventBroker ──► Subscription ──► Forwarder ──► sink
//! ```
//!
//! The [`SyncEngine`] is the single writer of the [`Mirror`]. Every change it
//! applies is republished through the [`EventBroker`]; the [`LeaseSweeper`]
//! removes keys whose lease expired without a delete notification.

mod api;
mod broker;
mod config;
mod constants;
mod errors;
pub mod health;
mod remote;
mod sweeper;
mod sync;
mod tree;
pub mod utils;

pub use api::*;
pub use broker::*;
pub use config::*;
pub use errors::*;
pub use remote::*;
pub use sweeper::*;
pub use sync::*;
pub use tree::*;
pub use utils::*;


#[cfg(test)]
pub mod test_utils;
