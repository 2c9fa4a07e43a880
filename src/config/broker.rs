use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BrokerConfig {
    /// Pending messages buffered per subscriber before drops start
    #[serde(default = "default_subscriber_buffer_size")]
    pub subscriber_buffer_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer_size: default_subscriber_buffer_size(),
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.subscriber_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "broker.subscriber_buffer_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_subscriber_buffer_size() -> usize {
    64
}
