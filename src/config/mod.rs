//! Configuration management for the mirror process.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`MIRROR__SECTION__FIELD`)
//! - Component-wise validation
mod broker;
mod remote;
mod retry;
mod server;
mod sweeper;
pub use broker::*;
pub use remote::*;
pub use retry::*;
pub use server::*;
pub use sweeper::*;


use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_PATH_ENV;
use crate::constants::ENV_PREFIX;
use crate::constants::ENV_SEPARATOR;
use crate::Result;

/// Main configuration container for the mirror components
///
/// Sources are merged with later ones overriding earlier ones:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MirrorConfig {
    /// Remote store connection parameters
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Event fan-out parameters
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Backoff policies for loading and watching
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Lease expiry sweep parameters
    #[serde(default)]
    pub sweeper: SweeperConfig,
    /// Produced interface parameters
    #[serde(default)]
    pub api: ApiConfig,
    /// Liveness endpoint parameters
    #[serde(default)]
    pub health: HealthConfig,
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("remote.endpoints")
}

impl MirrorConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Validation is deferred so further overrides can be applied with
    /// [`MirrorConfig::with_override_config`]. Callers must call `validate()`.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(environment());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Environment variables are re-applied on top so they keep the highest
    /// priority.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.remote.validate()?;
        self.broker.validate()?;
        self.retry.validate()?;
        self.sweeper.validate()?;
        self.api.validate()?;
        self.health.validate()?;
        Ok(self)
    }
}
