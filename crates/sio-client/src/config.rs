//! Bridge configuration, loadable from TOML.

use std::time::Duration;

use serde::Deserialize;
use sio_broker::BrokerConfig;

/// What the background listener does when draining the subscription fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumeErrorPolicy {
    /// Log the error and keep polling on the next interval.
    #[default]
    Continue,
    /// Log the error and end the background listener.
    Stop,
}

/// Everything needed to build a `SerialClient` with its own connection.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Serial port device name (e.g. "ttyUSB0", "COM3").
    pub device: String,
    /// Broker connection settings.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Pause between two background drains, in milliseconds.
    #[serde(default = "default_listen_interval")]
    pub listen_interval_ms: u64,
    /// Background listener behaviour on consume failures.
    #[serde(default)]
    pub on_consume_error: ConsumeErrorPolicy,
    /// Refuse to connect unless a router has registered the device.
    #[serde(default)]
    pub require_registered: bool,
}

fn default_listen_interval() -> u64 {
    10
}

impl BridgeConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            broker: BrokerConfig::default(),
            listen_interval_ms: default_listen_interval(),
            on_consume_error: ConsumeErrorPolicy::default(),
            require_registered: false,
        }
    }

    pub fn listen_interval(&self) -> Duration {
        Duration::from_millis(self.listen_interval_ms)
    }
}
