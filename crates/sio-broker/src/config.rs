use std::time::Duration;

use serde::Deserialize;
use sio_protocol::{BrokerAddress, DEFAULT_BROKER_IP, DEFAULT_BROKER_PORT};

/// Which broker client to speak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Redis,
    Mqtt,
}

/// Broker connection configuration, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Broker client backend (default Redis).
    #[serde(default)]
    pub backend: BackendKind,
    /// Broker IP address or hostname.
    #[serde(default = "default_host")]
    pub host: String,
    /// Broker port (default 6379).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound, in milliseconds, on how long one consume waits for the
    /// next pending message before returning.
    #[serde(default = "default_consume_timeout")]
    pub consume_timeout_ms: u64,
    /// How long a subscribe waits for the broker's acknowledgement.
    #[serde(default = "default_subscribe_timeout")]
    pub subscribe_timeout_ms: u64,
    /// MQTT client ID prefix. Subscribers append a unique suffix.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// MQTT keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
}

fn default_host() -> String {
    DEFAULT_BROKER_IP.to_string()
}

fn default_port() -> u16 {
    DEFAULT_BROKER_PORT
}

fn default_consume_timeout() -> u64 {
    1
}

fn default_subscribe_timeout() -> u64 {
    5_000
}

fn default_client_id() -> String {
    "serial-io".to_string()
}

fn default_keepalive() -> u16 {
    30
}

impl BrokerConfig {
    /// Redis configuration for the given address, everything else default.
    pub fn redis(address: &BrokerAddress) -> Self {
        Self {
            host: address.ip.clone(),
            port: address.port,
            ..Self::default()
        }
    }

    pub fn address(&self) -> BrokerAddress {
        BrokerAddress::new(self.host.clone(), self.port)
    }

    pub fn consume_timeout(&self) -> Duration {
        Duration::from_millis(self.consume_timeout_ms)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            host: default_host(),
            port: default_port(),
            consume_timeout_ms: default_consume_timeout(),
            subscribe_timeout_ms: default_subscribe_timeout(),
            client_id: default_client_id(),
            keepalive_secs: default_keepalive(),
        }
    }
}
