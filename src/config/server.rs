use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Parameters of the produced interface (reads, writes, live subscriptions)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    /// Enables writes and deletes through the mirror
    #[serde(default)]
    pub editable: bool,

    /// Idle interval after which a live subscription emits a liveness probe
    #[serde(default = "default_ping_period_secs")]
    pub ping_period_secs: u64,

    /// Bound for a single write to a subscriber's sink
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    /// Client messages above this size are ignored
    #[serde(default = "default_max_client_message_bytes")]
    pub max_client_message_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            editable: false,
            ping_period_secs: default_ping_period_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            max_client_message_bytes: default_max_client_message_bytes(),
        }
    }
}

impl ApiConfig {
    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ping_period_secs == 0 || self.write_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "api.ping_period_secs and api.write_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.max_client_message_bytes == 0 {
            return Err(Error::InvalidConfig(
                "api.max_client_message_bytes must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthConfig {
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            listen_addr: default_listen_addr(),
        }
    }
}

impl HealthConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| Error::InvalidConfig(format!("health.listen_addr {}: {}", self.listen_addr, e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled {
            self.socket_addr()?;
        }
        Ok(())
    }
}

fn default_ping_period_secs() -> u64 {
    240
}
fn default_write_timeout_secs() -> u64 {
    10
}
fn default_max_client_message_bytes() -> usize {
    1024
}
fn default_health_enabled() -> bool {
    true
}
fn default_listen_addr() -> String {
    "0.0.0.0:8081".to_string()
}
