//! Broker error types.

use thiserror::Error;

/// Errors that can occur during broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("consume error: {0}")]
    Consume(String),

    #[error("serial port device {0} is unavailable")]
    DeviceUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Convenience alias for broker results.
pub type BrokerResult<T> = Result<T, BrokerError>;
