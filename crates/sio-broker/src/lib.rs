//! Broker clients for serial-io bridges.
//!
//! Provides the publish/subscribe seam the bridge is written against:
//! - `Broker` trait for publishing and creating subscribers (shared handle)
//! - `Subscriber` trait for a single exclusively owned subscription
//! - `RedisBroker` for the Redis pub/sub deployments (default)
//! - `MqttBroker` for MQTT brokers using the same channel names as topics
//! - `InMemoryBroker` for tests without a broker

pub mod broker;
pub mod config;
pub mod error;
pub mod memory;
pub mod mqtt;
pub mod redis;

// Re-exports for convenience.
pub use broker::{Broker, MessageHandler, SharedBroker, Subscriber, connect};
pub use config::{BackendKind, BrokerConfig};
pub use error::{BrokerError, BrokerResult};
pub use memory::{InMemoryBroker, PublishedMessage};
pub use mqtt::MqttBroker;
pub use redis::RedisBroker;
