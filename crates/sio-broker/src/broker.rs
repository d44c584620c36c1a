//! Broker and subscriber traits, plus backend selection.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BackendKind, BrokerConfig};
use crate::error::BrokerResult;
use crate::mqtt::MqttBroker;
use crate::redis::RedisBroker;

/// Upper bound on messages dispatched by one consume, so a flooded channel
/// cannot pin the draining task forever.
pub const MAX_CONSUME_BATCH: usize = 1024;

// ── Broker trait ──────────────────────────────────────────────

/// A connection to a publish/subscribe broker.
///
/// Handles are shared (see [`SharedBroker`]) between every bridge talking
/// to the same broker; publishing must therefore be safe from many tasks.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a raw payload on a channel. No acknowledgement beyond the
    /// broker accepting the publish.
    async fn publish_bytes(&self, channel: &str, payload: &[u8]) -> BrokerResult<()>;

    /// Publish a text payload on a channel.
    async fn publish(&self, channel: &str, payload: &str) -> BrokerResult<()> {
        self.publish_bytes(channel, payload.as_bytes()).await
    }

    /// Create a fresh subscriber scoped to this connection.
    async fn subscriber(&self) -> BrokerResult<Box<dyn Subscriber>>;

    /// Whether a router has registered `device` in the device registry.
    /// Backends without a registry answer `None`.
    async fn is_registered(&self, _device: &str) -> BrokerResult<Option<bool>> {
        Ok(None)
    }
}

/// Reference-counted broker handle. The connection closes when the last
/// holder drops it.
pub type SharedBroker = Arc<dyn Broker>;

// ── Subscriber trait ──────────────────────────────────────────

/// Callback invoked as `(channel, payload)` for every consumed message.
/// Payloads are passed through as the broker delivered them, byte for byte.
pub type MessageHandler = Box<dyn Fn(&str, &[u8]) + Send + Sync>;

/// One subscription. Messages queue up inside the subscriber until
/// [`Subscriber::consume`] dispatches them to the registered handler.
#[async_trait]
pub trait Subscriber: Send {
    /// Subscribe to a channel.
    async fn subscribe(&mut self, channel: &str) -> BrokerResult<()>;

    /// Replace the handler invoked for consumed messages.
    fn on_message(&mut self, handler: MessageHandler);

    /// Dispatch the messages currently pending, waiting at most the
    /// configured consume timeout for each. Returns how many were handled.
    async fn consume(&mut self) -> BrokerResult<usize>;
}

// ── Backend selection ─────────────────────────────────────────

/// Open a new broker connection of the configured backend.
pub async fn connect(config: &BrokerConfig) -> BrokerResult<SharedBroker> {
    let broker: SharedBroker = match config.backend {
        BackendKind::Redis => Arc::new(RedisBroker::connect(config).await?),
        BackendKind::Mqtt => Arc::new(MqttBroker::connect(config).await?),
    };
    Ok(broker)
}
