mod client;
pub(crate) mod proto;

pub use client::*;
