use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::link::{LinkConfig, PeerAddressParseError};
use crate::push::PushConfig;
use crate::scheduler::SchedulerConfig;
use crate::simulation::SimulationConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidPeerAddress(#[from] PeerAddressParseError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete bridge configuration.
///
/// Every section falls back to its defaults, so a configuration file only
/// needs the values it changes:
///
/// ```json
/// { "link": { "peer": "D4:F9:8D:05:83:70" }, "push": { "max_clients": 4 } }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub link: LinkConfig,
    pub push: PushConfig,
    pub scheduler: SchedulerConfig,
    pub simulation: SimulationConfig,
}

impl BridgeConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("scheduler.tick_interval_ms must be positive".into()));
        }
        if self.simulation.min_value >= self.simulation.max_value {
            return Err(ConfigError::Invalid(format!(
                "simulation range [{}, {}) is empty",
                self.simulation.min_value, self.simulation.max_value
            )));
        }
        if self.push.max_clients == 0 {
            return Err(ConfigError::Invalid("push.max_clients must be at least 1".into()));
        }
        if !self.push.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "push.path `{}` must start with '/'",
                self.push.path
            )));
        }
        if self.link.peer == self.link.local_address {
            return Err(ConfigError::Invalid(format!(
                "link.peer and link.local_address are both {}",
                self.link.peer
            )));
        }
        Ok(())
    }
}
