use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Connection parameters for the remote store
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RemoteConfig {
    /// Remote store endpoints, e.g. `http://etcd:2379`
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    /// Key prefix that is mirrored; empty mirrors the whole keyspace
    #[serde(default)]
    pub prefix: String,

    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,

    #[serde(default = "default_keepalive_timeout_ms")]
    pub keepalive_timeout_ms: u64,

    /// Upper bound for every unary call and for opening a watch
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            prefix: String::new(),
            dial_timeout_ms: default_dial_timeout_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            keepalive_timeout_ms: default_keepalive_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl RemoteConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::InvalidConfig("remote.endpoints cannot be empty".into()));
        }
        if let Some(bad) = self
            .endpoints
            .iter()
            .find(|e| !(e.starts_with("http://") || e.starts_with("https://")))
        {
            return Err(Error::InvalidConfig(format!(
                "remote endpoint {bad} must start with http:// or https://"
            )));
        }
        if self.dial_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "remote dial and request timeouts must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:2379".to_string()]
}
fn default_dial_timeout_ms() -> u64 {
    7000
}
fn default_keepalive_interval_ms() -> u64 {
    30000
}
fn default_keepalive_timeout_ms() -> u64 {
    10000
}
fn default_request_timeout_ms() -> u64 {
    5000
}
