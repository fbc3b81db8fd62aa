//! Handler configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CecError;

/// Timing and policy knobs for the dispatcher, transmit engine and arbiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Per-attempt wait for a correlated response (ms)
    #[serde(default = "default_transmit_timeout_ms")]
    pub transmit_timeout_ms: u64,
    /// Attempts after the first
    #[serde(default = "default_transmit_retries")]
    pub transmit_retries: u8,
    /// Delay before a failed activation is retried (ms)
    #[serde(default = "default_active_source_retry_ms")]
    pub active_source_retry_ms: u64,
    /// Minimum spacing of unforced TV power status requests (ms)
    #[serde(default = "default_power_status_refresh_ms")]
    pub power_status_refresh_ms: u64,
    /// How often the actor re-checks pending activations (ms)
    #[serde(default = "default_retry_poll_interval_ms")]
    pub retry_poll_interval_ms: u64,
    /// Report deck status to the TV after becoming active source
    #[serde(default)]
    pub send_deck_status_on_active_source: bool,
}

fn default_transmit_timeout_ms() -> u64 {
    1000
}

fn default_transmit_retries() -> u8 {
    1
}

fn default_active_source_retry_ms() -> u64 {
    1000
}

fn default_power_status_refresh_ms() -> u64 {
    5000
}

fn default_retry_poll_interval_ms() -> u64 {
    250
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            transmit_timeout_ms: default_transmit_timeout_ms(),
            transmit_retries: default_transmit_retries(),
            active_source_retry_ms: default_active_source_retry_ms(),
            power_status_refresh_ms: default_power_status_refresh_ms(),
            retry_poll_interval_ms: default_retry_poll_interval_ms(),
            send_deck_status_on_active_source: false,
        }
    }
}

impl HandlerConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, CecError> {
        let config: HandlerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CecError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), CecError> {
        if self.transmit_timeout_ms == 0 {
            return Err(CecError::InvalidConfig(
                "transmit_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.retry_poll_interval_ms == 0 {
            return Err(CecError::InvalidConfig(
                "retry_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn transmit_timeout(&self) -> Duration {
        Duration::from_millis(self.transmit_timeout_ms)
    }

    pub fn active_source_retry(&self) -> Duration {
        Duration::from_millis(self.active_source_retry_ms)
    }

    pub fn power_status_refresh(&self) -> Duration {
        Duration::from_millis(self.power_status_refresh_ms)
    }

    pub fn retry_poll_interval(&self) -> Duration {
        Duration::from_millis(self.retry_poll_interval_ms)
    }
}
