//! Lease sweep configuration
//!
//! ```toml
//! [sweeper]
//! enabled = true
//! interval_secs = 300    # sweeps run on wall-clock multiples of this
//! query_timeout_ms = 2000
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SweeperConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Sweep cadence. Ticks are aligned to multiples of this interval since
    /// the Unix epoch.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Bound for each lease time-to-live query
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.interval_secs == 0 {
            return Err(Error::InvalidConfig("sweeper.interval_secs must be greater than 0".into()));
        }
        if self.query_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "sweeper.query_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_enabled() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    300
}
fn default_query_timeout_ms() -> u64 {
    2000
}
