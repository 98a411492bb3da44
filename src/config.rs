use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TICK_INTERVAL_SECS: f64 = 0.002;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
    #[error("tick interval must be a positive number of seconds, got {0}")]
    InvalidInterval(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Seconds between polls of the dispatch loop.
    pub tick_interval_secs: f64,
    pub client_name: String,
    /// Substring of the output port to use; first port when unset.
    pub port_name: Option<String>,
    /// Print the send log once playback ends.
    pub report: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            client_name: "midi_replay".to_string(),
            port_name: None,
            report: true,
        }
    }
}

impl ReplayConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ron_string = fs::read_to_string(path)?;
        Self::from_ron(&ron_string)
    }

    pub fn from_ron(ron_string: &str) -> Result<Self, ConfigError> {
        let config: ReplayConfig = ron::from_str(ron_string)?;
        config.tick_interval()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;
        Ok(())
    }

    pub fn tick_interval(&self) -> Result<Duration, ConfigError> {
        match Duration::try_from_secs_f64(self.tick_interval_secs) {
            Ok(d) if !d.is_zero() => Ok(d),
            _ => Err(ConfigError::InvalidInterval(self.tick_interval_secs)),
        }
    }
}
