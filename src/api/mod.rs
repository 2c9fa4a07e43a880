mod forwarder;
mod message;
mod service;

pub use forwarder::*;
pub use message::*;
pub use service::*;

#[cfg(test)]
mod forwarder_test;
