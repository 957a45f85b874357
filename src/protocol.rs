//! Topic layout and control payloads.
//!
//! Every SenseClima topic has the form
//! `hana/{environment}/senseclima/{device_id}/{channel}`:
//!
//! - `temperature` and `humidity` carry published readings (retained)
//! - `interval` carries inbound commands: a decimal count of seconds

use crate::device::DeviceId;
use core::num::NonZeroU64;
use thiserror::Error;

pub const TOPIC_ROOT: &str = "hana";
pub const DEVICE_KIND: &str = "senseclima";

pub const TEMPERATURE_CHANNEL: &str = "temperature";
pub const HUMIDITY_CHANNEL: &str = "humidity";
pub const INTERVAL_CHANNEL: &str = "interval";

/// Largest accepted interval command in seconds (`u32::MAX`, about 136 years).
pub const MAX_INTERVAL_SECS: u64 = 4_294_967_295;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("payload is not valid UTF-8")]
    InvalidEncoding,
    #[error("interval '{0}' is not a positive integer number of seconds")]
    InvalidInterval(String),
    #[error("environment '{0}' is empty or contains a topic separator or wildcard")]
    InvalidEnvironment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    environment: String,
}

impl Topics {
    /// Topics for `environment`, lower-cased. Rejects names that would not
    /// form a single topic level.
    pub fn new(environment: &str) -> Result<Self, ProtocolError> {
        let environment = environment.trim().to_lowercase();
        if environment.is_empty() || environment.contains(|c: char| matches!(c, '/' | '+' | '#')) {
            return Err(ProtocolError::InvalidEnvironment(environment));
        }

        Ok(Self { environment })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn temperature(&self, device: &DeviceId) -> String {
        self.device_topic(device, TEMPERATURE_CHANNEL)
    }

    pub fn humidity(&self, device: &DeviceId) -> String {
        self.device_topic(device, HUMIDITY_CHANNEL)
    }

    pub fn interval(&self, device: &DeviceId) -> String {
        self.device_topic(device, INTERVAL_CHANNEL)
    }

    fn device_topic(&self, device: &DeviceId, channel: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            TOPIC_ROOT, self.environment, DEVICE_KIND, device, channel
        )
    }

    /// Device addressed by an interval topic of this environment, if any.
    pub fn parse_control(&self, topic: &str) -> Option<DeviceId> {
        let mut parts = topic.split('/');
        let root = parts.next()?;
        let environment = parts.next()?;
        let kind = parts.next()?;
        let device = parts.next()?;
        let channel = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        if root != TOPIC_ROOT
            || environment != self.environment
            || kind != DEVICE_KIND
            || channel != INTERVAL_CHANNEL
        {
            return None;
        }

        DeviceId::new(device).ok()
    }
}

/// Parse an interval command payload: a decimal integer in `1..=MAX_INTERVAL_SECS`.
pub fn parse_interval(payload: &[u8]) -> Result<NonZeroU64, ProtocolError> {
    let text = core::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidEncoding)?;
    let trimmed = text.trim();

    trimmed
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs <= MAX_INTERVAL_SECS)
        .and_then(NonZeroU64::new)
        .ok_or_else(|| ProtocolError::InvalidInterval(trimmed.to_string()))
}
