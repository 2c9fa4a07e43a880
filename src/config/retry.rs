use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Consecutive failures tolerated before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based): the base delay doubled
    /// per attempt, capped at `max_delay_ms`.
    pub fn delay_for(
        &self,
        attempt: usize,
    ) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(63) as u32).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig(format!("retry.{name}.max_retries must be greater than 0")));
        }
        if self.base_delay_ms == 0 {
            return Err(Error::InvalidConfig(format!("retry.{name}.base_delay_ms must be greater than 0")));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "retry.{name}.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Divide strategies by phase of the sync engine
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RetryPolicies {
    /// Initial full load of the keyspace
    #[serde(default)]
    pub load: BackoffPolicy,

    /// Re-establishing the change stream after it ends or fails
    #[serde(default)]
    pub watch: BackoffPolicy,
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.load.validate("load")?;
        self.watch.validate("watch")?;
        Ok(())
    }
}

// 20ms doubling ten times stays under the 10s ceiling
fn default_max_retries() -> usize {
    10
}
fn default_op_timeout_ms() -> u64 {
    5000
}
fn default_base_delay_ms() -> u64 {
    20
}
fn default_max_delay_ms() -> u64 {
    10000
}
