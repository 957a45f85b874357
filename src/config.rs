//! Simulation defaults and JSON configuration.

use crate::protocol::MAX_INTERVAL_SECS;
use core::num::NonZeroU64;
use rand::Rng;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BROKER_HOST: &str = "131.255.82.115";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_CLIENT_ID_PREFIX: &str = "senseclima_sim_dyn";
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

// Publish interval in real seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 10;
// 3600x: one real second is one simulated hour, a full day takes 24 seconds
pub const DEFAULT_SPEED_FACTOR: f64 = 3600.0;
pub const DEFAULT_START_HOUR: u32 = 7;
pub const DEFAULT_START_MINUTE: u32 = 0;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

const MAX_CLIENT_SUFFIX: u32 = 1000;
const MIN_KEEP_ALIVE_SECS: u64 = 5;

const_assert!(DEFAULT_INTERVAL_SECS > 0);
const_assert!(DEFAULT_POLL_INTERVAL_MS > 0);
const_assert!(DEFAULT_START_HOUR < 24 && DEFAULT_START_MINUTE < 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id_prefix: String,
    pub keep_alive_secs: u64,
    pub default_interval_secs: u64,
    pub speed_factor: f64,
    pub start_hour: u32,
    pub start_minute: u32,
    pub poll_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            broker_host: DEFAULT_BROKER_HOST.to_string(),
            broker_port: DEFAULT_BROKER_PORT,
            client_id_prefix: DEFAULT_CLIENT_ID_PREFIX.to_string(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            default_interval_secs: DEFAULT_INTERVAL_SECS,
            speed_factor: DEFAULT_SPEED_FACTOR,
            start_hour: DEFAULT_START_HOUR,
            start_minute: DEFAULT_START_MINUTE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl SimulationConfig {
    /// Load from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_host.trim().is_empty() {
            return Err(ConfigError::Invalid("broker host must not be empty".into()));
        }
        if self.default_interval_secs == 0 {
            return Err(ConfigError::Invalid("publish interval must be positive".into()));
        }
        if self.default_interval_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "publish interval must not exceed {} seconds",
                MAX_INTERVAL_SECS
            )));
        }
        if !self.speed_factor.is_finite() || self.speed_factor <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "speed factor must be positive, got {}",
                self.speed_factor
            )));
        }
        if self.start_hour > 23 || self.start_minute > 59 {
            return Err(ConfigError::Invalid(format!(
                "start of day {:02}:{:02} is not a valid time",
                self.start_hour, self.start_minute
            )));
        }
        if self.keep_alive_secs != 0 && self.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(ConfigError::Invalid(format!(
                "keep-alive must be 0 or at least {} seconds",
                MIN_KEEP_ALIVE_SECS
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll interval must be positive".into()));
        }
        Ok(())
    }

    pub fn default_interval(&self) -> Result<NonZeroU64, ConfigError> {
        NonZeroU64::new(self.default_interval_secs)
            .ok_or_else(|| ConfigError::Invalid("publish interval must be positive".into()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// MQTT client id, `{prefix}-{environment}-{n}` with a random `n` so
    /// several simulators can share a broker.
    pub fn client_id(&self, environment: &str) -> String {
        let suffix = rand::thread_rng().gen_range(0..=MAX_CLIENT_SUFFIX);
        format!("{}-{}-{}", self.client_id_prefix, environment, suffix)
    }
}
