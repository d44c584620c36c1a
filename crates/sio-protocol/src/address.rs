//! Broker addressing: `tcp://<ip>:<port>`.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_BROKER_IP: &str = "127.0.0.1";
pub const DEFAULT_BROKER_PORT: u16 = 6379;

const SCHEME: &str = "tcp://";

/// Errors produced when parsing a broker address string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("unsupported scheme in '{0}' (expected tcp://)")]
    Scheme(String),

    #[error("missing host in '{0}'")]
    MissingHost(String),

    #[error("invalid port in '{0}'")]
    Port(String),
}

/// Location of the message broker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerAddress {
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_ip() -> String {
    DEFAULT_BROKER_IP.to_string()
}

fn default_port() -> u16 {
    DEFAULT_BROKER_PORT
}

impl BrokerAddress {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// The `tcp://<ip>:<port>` form used in logs and configuration.
    pub fn url(&self) -> String {
        self.to_string()
    }
}

impl Default for BrokerAddress {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_IP, DEFAULT_BROKER_PORT)
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ip.contains(':') {
            write!(f, "{SCHEME}[{}]:{}", self.ip, self.port)
        } else {
            write!(f, "{SCHEME}{}:{}", self.ip, self.port)
        }
    }
}

/// Accepts `tcp://host:port`, `host:port` or a bare `host` (default port).
impl FromStr for BrokerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = match s.split_once("://") {
            Some(("tcp", rest)) => rest,
            Some(_) => return Err(AddressError::Scheme(s.to_string())),
            None => s,
        };

        // Bracketed IPv6: [::1]:6379
        if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| AddressError::MissingHost(s.to_string()))?;
            if host.is_empty() {
                return Err(AddressError::MissingHost(s.to_string()));
            }
            let port = match tail.strip_prefix(':') {
                Some(port) => port
                    .parse()
                    .map_err(|_| AddressError::Port(s.to_string()))?,
                None if tail.is_empty() => DEFAULT_BROKER_PORT,
                None => return Err(AddressError::Port(s.to_string())),
            };
            return Ok(Self::new(host, port));
        }

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse()
                    .map_err(|_| AddressError::Port(s.to_string()))?,
            ),
            None => (rest, DEFAULT_BROKER_PORT),
        };

        if host.is_empty() {
            return Err(AddressError::MissingHost(s.to_string()));
        }

        Ok(Self::new(host, port))
    }
}
