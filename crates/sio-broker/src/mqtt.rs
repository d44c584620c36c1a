//! MQTT backend.
//!
//! Channel names are used verbatim as MQTT topics and messages travel at
//! QoS 0, which matches Redis pub/sub delivery. The shared handle owns one
//! `AsyncClient` whose event loop is driven by a background task; every
//! subscriber gets its own client and event loop, polled only from
//! [`Subscriber::consume`].
//!
//! A subscriber whose connection drops reports the failure from the
//! `consume` that sees it. The next `consume` reconnects with a clean
//! session and subscribes to every channel again, so the subscription
//! outlives broker restarts and keep-alive timeouts.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broker::{Broker, MAX_CONSUME_BATCH, MessageHandler, Subscriber};
use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};

/// Capacity of the request queue between a client and its event loop.
const REQUEST_CAPACITY: usize = 64;

// ── MqttBroker ────────────────────────────────────────────────

/// Connection to an MQTT broker.
pub struct MqttBroker {
    client: AsyncClient,
    driver: JoinHandle<()>,
    config: BrokerConfig,
    endpoint: String,
}

impl MqttBroker {
    /// Connect and wait for the broker's CONNACK before returning.
    pub async fn connect(config: &BrokerConfig) -> BrokerResult<Self> {
        let endpoint = config.address().url();
        let (client, mut eventloop) = new_client(config, "pub");
        await_connack(&mut eventloop, &endpoint).await?;

        tracing::info!(endpoint = %endpoint, "connected to mqtt broker");

        // Once the connection fails the event loop is dropped, so later
        // publishes fail immediately instead of queueing for a reconnect.
        let driver_endpoint = endpoint.clone();
        let driver = tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    tracing::error!(endpoint = %driver_endpoint, error = %e, "mqtt connection lost");
                    break;
                }
            }
        });

        Ok(Self {
            client,
            driver,
            config: config.clone(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn publish_bytes(&self, channel: &str, payload: &[u8]) -> BrokerResult<()> {
        self.client
            .publish(channel, QoS::AtMostOnce, false, payload.to_vec())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        tracing::debug!(channel, "published");
        Ok(())
    }

    async fn subscriber(&self) -> BrokerResult<Box<dyn Subscriber>> {
        let (client, mut eventloop) = new_client(&self.config, "sub");
        await_connack(&mut eventloop, &self.endpoint).await?;

        Ok(Box::new(MqttSubscriber {
            client,
            eventloop,
            channels: Vec::new(),
            handler: None,
            consume_timeout: self.config.consume_timeout(),
            subscribe_timeout: self.config.subscribe_timeout(),
        }))
    }
}

// ── MqttSubscriber ────────────────────────────────────────────

struct MqttSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    channels: Vec<String>,
    handler: Option<MessageHandler>,
    consume_timeout: Duration,
    subscribe_timeout: Duration,
}

/// What one polled event means to a subscriber.
#[derive(Debug, PartialEq, Eq)]
enum Incoming<'a> {
    /// A publish on one of the subscribed channels.
    Message { channel: &'a str, payload: &'a [u8] },
    /// A fresh session without our subscriptions.
    SessionLost,
    /// Acks, pings, outgoing packets and foreign publishes.
    Ignored,
}

fn classify<'a>(event: &'a Event, channels: &[String]) -> Incoming<'a> {
    match event {
        Event::Incoming(Packet::Publish(publish))
            if channels.iter().any(|c| *c == publish.topic) =>
        {
            Incoming::Message {
                channel: publish.topic.as_str(),
                payload: &publish.payload[..],
            }
        }
        Event::Incoming(Packet::ConnAck(ack)) if !ack.session_present => Incoming::SessionLost,
        _ => Incoming::Ignored,
    }
}

impl MqttSubscriber {
    /// Queue a subscribe for every channel on the new session. The SUBACKs
    /// arrive through later polls.
    async fn resubscribe(&mut self) -> BrokerResult<()> {
        tracing::warn!(channels = ?self.channels, "mqtt session lost, subscribing again");
        for channel in &self.channels {
            self.client
                .subscribe(channel.as_str(), QoS::AtMostOnce)
                .await
                .map_err(|e| BrokerError::Subscribe(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Subscriber for MqttSubscriber {
    async fn subscribe(&mut self, channel: &str) -> BrokerResult<()> {
        self.client
            .subscribe(channel, QoS::AtMostOnce)
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        // Drive the loop until the SUBACK so publishes made after this call
        // returns are routed to us.
        let eventloop = &mut self.eventloop;
        let acked = tokio::time::timeout(self.subscribe_timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::SubAck(_))) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => return Err(BrokerError::Subscribe(e.to_string())),
                }
            }
        })
        .await;

        match acked {
            Ok(result) => result?,
            Err(_) => {
                return Err(BrokerError::Subscribe(format!(
                    "no SUBACK for {channel} within {:?}",
                    self.subscribe_timeout
                )));
            }
        }

        self.channels.push(channel.to_string());
        Ok(())
    }

    fn on_message(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }

    async fn consume(&mut self) -> BrokerResult<usize> {
        let mut handled = 0;

        while handled < MAX_CONSUME_BATCH {
            let event = match tokio::time::timeout(self.consume_timeout, self.eventloop.poll()).await
            {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => return Err(BrokerError::Consume(e.to_string())),
                Err(_) => break,
            };

            match classify(&event, &self.channels) {
                Incoming::Message { channel, payload } => {
                    if let Some(handler) = &self.handler {
                        handler(channel, payload);
                    }
                    handled += 1;
                }
                Incoming::SessionLost => self.resubscribe().await?,
                Incoming::Ignored => {}
            }
        }

        Ok(handled)
    }
}

// ── Internal helpers ──────────────────────────────────────────

fn new_client(config: &BrokerConfig, role: &str) -> (AsyncClient, EventLoop) {
    let client_id = format!("{}-{role}-{}", config.client_id, Uuid::now_v7().simple());
    let mut options = MqttOptions::new(client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keepalive_secs.into()));
    AsyncClient::new(options, REQUEST_CAPACITY)
}

async fn await_connack(eventloop: &mut EventLoop, endpoint: &str) -> BrokerResult<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(BrokerError::Connection(format!("{endpoint}: {e}"))),
        }
    }
}
