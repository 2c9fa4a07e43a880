//! Mirror Error Hierarchy
//!
//! Errors are split by the boundary they cross: failures talking to the
//! remote store, configuration problems, and per-request failures on the
//! produced interface. Tree and broker internals never surface errors of
//! their own.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Remote store failures (network, timeout, watch cancellation)
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration loaded but rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Mutation attempted while the mirror is read-only
    #[error("Mutation forbidden: mirror is not editable")]
    Forbidden,

    /// Unreadable client input on the write path
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    /// The downstream sink of a live subscription is gone
    #[error("Subscription sink closed")]
    SinkClosed,

    #[error("Subscription sink write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Channel or connection level failures
    #[error("Transport failure: {0}")]
    Transport(String),

    /// gRPC status returned by the remote store
    #[error(transparent)]
    Status(#[from] Box<tonic::Status>),

    /// A bounded call did not complete in time
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The requested watch revision was discarded by compaction
    #[error("Requested revision compacted, oldest available is {compact_revision}")]
    Compacted { compact_revision: i64 },

    /// The remote store cancelled a watch for a reason other than compaction
    #[error("Watch canceled: {0}")]
    WatchCanceled(String),

    /// Malformed endpoint URI in configuration
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl From<tonic::Status> for RemoteError {
    fn from(status: tonic::Status) -> Self {
        RemoteError::Status(Box::new(status))
    }
}

impl From<tonic::transport::Error> for RemoteError {
    fn from(e: tonic::transport::Error) -> Self {
        RemoteError::Transport(e.to_string())
    }
}
