//! Redis pub/sub backend.
//!
//! Publishing goes through one multiplexed connection that every clone of
//! the shared handle reuses. Each subscriber opens its own pub/sub
//! connection from the same client, since a Redis connection in subscribe
//! mode cannot issue regular commands.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{MultiplexedConnection, PubSub};
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tokio_stream::StreamExt;

use sio_protocol::DEVICE_REGISTRY_KEY;

use crate::broker::{Broker, MAX_CONSUME_BATCH, MessageHandler, Subscriber};
use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};

// ── RedisBroker ───────────────────────────────────────────────

/// Connection to a Redis server used as the message broker.
pub struct RedisBroker {
    client: Client,
    connection: MultiplexedConnection,
    endpoint: String,
    consume_timeout: Duration,
    subscribe_timeout: Duration,
}

impl RedisBroker {
    /// Connect to `tcp://<host>:<port>` from the config.
    pub async fn connect(config: &BrokerConfig) -> BrokerResult<Self> {
        let endpoint = config.address().url();
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo::default(),
        };

        let client = Client::open(info)
            .map_err(|e| BrokerError::Connection(format!("{endpoint}: {e}")))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(format!("{endpoint}: {e}")))?;

        tracing::info!(endpoint = %endpoint, "connected to redis broker");

        Ok(Self {
            client,
            connection,
            endpoint,
            consume_timeout: config.consume_timeout(),
            subscribe_timeout: config.subscribe_timeout(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Announce `device` in the registry set, as a router does on startup.
    pub async fn register_device(&self, device: &str) -> BrokerResult<()> {
        let mut connection = self.connection.clone();
        let _: i64 = connection
            .sadd(DEVICE_REGISTRY_KEY, device)
            .await
            .map_err(|e| BrokerError::Other(e.to_string()))?;
        Ok(())
    }

    /// Remove `device` from the registry set.
    pub async fn unregister_device(&self, device: &str) -> BrokerResult<()> {
        let mut connection = self.connection.clone();
        let _: i64 = connection
            .srem(DEVICE_REGISTRY_KEY, device)
            .await
            .map_err(|e| BrokerError::Other(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish_bytes(&self, channel: &str, payload: &[u8]) -> BrokerResult<()> {
        let mut connection = self.connection.clone();
        let receivers: i64 = connection
            .publish(channel, payload)
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        tracing::debug!(channel, receivers, "published");
        Ok(())
    }

    async fn subscriber(&self) -> BrokerResult<Box<dyn Subscriber>> {
        let pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::Connection(format!("{}: {e}", self.endpoint)))?;

        Ok(Box::new(RedisSubscriber {
            pubsub,
            handler: None,
            consume_timeout: self.consume_timeout,
            subscribe_timeout: self.subscribe_timeout,
        }))
    }

    async fn is_registered(&self, device: &str) -> BrokerResult<Option<bool>> {
        let mut connection = self.connection.clone();
        let registered: bool = connection
            .sismember(DEVICE_REGISTRY_KEY, device)
            .await
            .map_err(|e| BrokerError::Other(e.to_string()))?;
        Ok(Some(registered))
    }
}

// ── RedisSubscriber ───────────────────────────────────────────

struct RedisSubscriber {
    pubsub: PubSub,
    handler: Option<MessageHandler>,
    consume_timeout: Duration,
    subscribe_timeout: Duration,
}

#[async_trait]
impl Subscriber for RedisSubscriber {
    async fn subscribe(&mut self, channel: &str) -> BrokerResult<()> {
        match tokio::time::timeout(self.subscribe_timeout, self.pubsub.subscribe(channel)).await {
            Ok(result) => result.map_err(|e| BrokerError::Subscribe(e.to_string())),
            Err(_) => Err(BrokerError::Subscribe(format!(
                "no reply to subscribe on {channel} within {:?}",
                self.subscribe_timeout
            ))),
        }
    }

    fn on_message(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }

    async fn consume(&mut self) -> BrokerResult<usize> {
        let mut messages = std::pin::pin!(self.pubsub.on_message());
        let mut handled = 0;

        while handled < MAX_CONSUME_BATCH {
            match tokio::time::timeout(self.consume_timeout, messages.next()).await {
                Ok(Some(msg)) => {
                    if let Some(handler) = &self.handler {
                        handler(msg.get_channel_name(), msg.get_payload_bytes());
                    }
                    handled += 1;
                }
                Ok(None) => {
                    return Err(BrokerError::Consume(
                        "redis subscription connection closed".to_string(),
                    ));
                }
                // Nothing pending within the timeout.
                Err(_) => break,
            }
        }

        Ok(handled)
    }
}
