//! In-process broker for testing without a real server.
//!
//! Delivers publishes to in-memory subscribers with the same semantics as
//! Redis pub/sub (fire-and-forget, per-channel fan-out, publish order) and
//! records every publish for assertion in tests. An offline switch makes
//! every operation fail, for exercising error paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::broker::{Broker, MAX_CONSUME_BATCH, MessageHandler, Subscriber};
use crate::error::{BrokerError, BrokerResult};

/// A recorded publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// The payload as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

type Delivery = (String, Vec<u8>);

#[derive(Default)]
struct Shared {
    routes: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Delivery>>>>,
    offline: AtomicBool,
}

impl Shared {
    fn ensure_online(&self, fail: fn(String) -> BrokerError) -> BrokerResult<()> {
        if self.offline.load(Ordering::Acquire) {
            return Err(fail("broker offline".to_string()));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── InMemoryBroker ────────────────────────────────────────────

/// In-memory implementation of the `Broker` trait.
#[derive(Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
    published: Mutex<Vec<PublishedMessage>>,
    registry: Mutex<HashSet<String>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.published).clone()
    }

    /// Get published messages for a specific channel.
    pub fn published_to(&self, channel: &str) -> Vec<PublishedMessage> {
        lock(&self.published)
            .iter()
            .filter(|m| m.channel == channel)
            .cloned()
            .collect()
    }

    /// Get the last published message.
    pub fn last_published(&self) -> Option<PublishedMessage> {
        lock(&self.published).last().cloned()
    }

    /// Number of live subscriptions to a channel.
    pub fn subscription_count(&self, channel: &str) -> usize {
        lock(&self.shared.routes).get(channel).map_or(0, Vec::len)
    }

    /// Announce a device in the registry, as a router would.
    pub fn register_device(&self, device: &str) {
        lock(&self.registry).insert(device.to_string());
    }

    pub fn unregister_device(&self, device: &str) {
        lock(&self.registry).remove(device);
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::Release);
    }

    /// Clear the publish record.
    pub fn reset(&self) {
        lock(&self.published).clear();
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish_bytes(&self, channel: &str, payload: &[u8]) -> BrokerResult<()> {
        self.shared.ensure_online(BrokerError::Publish)?;

        lock(&self.published).push(PublishedMessage {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        });

        if let Some(senders) = lock(&self.shared.routes).get(channel) {
            for tx in senders {
                // A receiver can only be gone mid-drop; its routes are
                // removed right after.
                let _ = tx.send((channel.to_string(), payload.to_vec()));
            }
        }
        Ok(())
    }

    async fn subscriber(&self) -> BrokerResult<Box<dyn Subscriber>> {
        self.shared.ensure_online(BrokerError::Connection)?;

        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Box::new(InMemorySubscriber {
            shared: Arc::clone(&self.shared),
            tx,
            rx,
            handler: None,
        }))
    }

    async fn is_registered(&self, device: &str) -> BrokerResult<Option<bool>> {
        self.shared.ensure_online(BrokerError::Other)?;
        Ok(Some(lock(&self.registry).contains(device)))
    }
}

// ── InMemorySubscriber ────────────────────────────────────────

/// Dropping the subscriber removes its routes.

struct InMemorySubscriber {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<Delivery>,
    rx: mpsc::UnboundedReceiver<Delivery>,
    handler: Option<MessageHandler>,
}

#[async_trait]
impl Subscriber for InMemorySubscriber {
    async fn subscribe(&mut self, channel: &str) -> BrokerResult<()> {
        self.shared.ensure_online(BrokerError::Subscribe)?;
        let mut routes = lock(&self.shared.routes);
        let senders = routes.entry(channel.to_string()).or_default();
        if !senders.iter().any(|tx| tx.same_channel(&self.tx)) {
            senders.push(self.tx.clone());
        }
        Ok(())
    }

    fn on_message(&mut self, handler: MessageHandler) {
        self.handler = Some(handler);
    }

    async fn consume(&mut self) -> BrokerResult<usize> {
        self.shared.ensure_online(BrokerError::Consume)?;

        let mut handled = 0;
        while handled < MAX_CONSUME_BATCH {
            let Ok((channel, payload)) = self.rx.try_recv() else {
                break;
            };
            if let Some(handler) = &self.handler {
                handler(channel.as_str(), payload.as_slice());
            }
            handled += 1;
        }
        Ok(handled)
    }
}

impl Drop for InMemorySubscriber {
    fn drop(&mut self) {
        let mut routes = lock(&self.shared.routes);
        routes.retain(|_, senders| {
            senders.retain(|tx| !tx.same_channel(&self.tx));
            !senders.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting(
        subscriber: &mut Box<dyn Subscriber>,
    ) -> Arc<Mutex<Vec<(String, String)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        subscriber.on_message(Box::new(move |channel, payload| {
            sink.lock()
                .unwrap()
                .push((channel.to_string(), String::from_utf8_lossy(payload).into_owned()));
        }));
        seen
    }

    #[tokio::test]
    async fn publish_records_messages() {
        let broker = InMemoryBroker::new();
        broker.publish("test/channel", "hello").await.unwrap();
        broker.publish("test/other", "world").await.unwrap();

        let msgs = broker.published();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].channel, "test/channel");
        assert_eq!(msgs[0].payload, b"hello");
        assert_eq!(msgs[0].text(), "hello");
        assert_eq!(msgs[1].channel, "test/other");
        assert_eq!(broker.last_published().unwrap().text(), "world");
        assert_eq!(broker.published_to("test/channel").len(), 1);
    }

    #[tokio::test]
    async fn consume_delivers_in_publish_order() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscriber().await.unwrap();
        sub.subscribe("a").await.unwrap();
        let seen = collecting(&mut sub);

        for payload in ["1", "2", "3"] {
            broker.publish("a", payload).await.unwrap();
        }
        broker.publish("b", "ignored").await.unwrap();

        assert_eq!(sub.consume().await.unwrap(), 3);
        let payloads: Vec<String> = seen.lock().unwrap().iter().map(|(_, p)| p.clone()).collect();
        assert_eq!(payloads, ["1", "2", "3"]);

        // Drained: a second consume finds nothing.
        assert_eq!(sub.consume().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn messages_before_subscribe_are_not_delivered() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscriber().await.unwrap();
        broker.publish("a", "early").await.unwrap();
        sub.subscribe("a").await.unwrap();

        assert_eq!(sub.consume().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fan_out_to_every_subscriber() {
        let broker = InMemoryBroker::new();
        let mut first = broker.subscriber().await.unwrap();
        let mut second = broker.subscriber().await.unwrap();
        first.subscribe("a").await.unwrap();
        second.subscribe("a").await.unwrap();
        assert_eq!(broker.subscription_count("a"), 2);

        broker.publish("a", "x").await.unwrap();
        assert_eq!(first.consume().await.unwrap(), 1);
        assert_eq!(second.consume().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscriber().await.unwrap();
        sub.subscribe("a").await.unwrap();
        assert_eq!(broker.subscription_count("a"), 1);

        drop(sub);
        assert_eq!(broker.subscription_count("a"), 0);
        assert!(lock(&broker.shared.routes).is_empty());
        broker.publish("a", "nobody listening").await.unwrap();
    }

    #[tokio::test]
    async fn dropping_one_subscriber_keeps_the_others() {
        let broker = InMemoryBroker::new();
        let mut kept = broker.subscriber().await.unwrap();
        let mut dropped = broker.subscriber().await.unwrap();
        kept.subscribe("a").await.unwrap();
        dropped.subscribe("a").await.unwrap();
        dropped.subscribe("b").await.unwrap();

        drop(dropped);
        assert_eq!(broker.subscription_count("a"), 1);
        assert!(!lock(&broker.shared.routes).contains_key("b"));

        broker.publish("a", "x").await.unwrap();
        assert_eq!(kept.consume().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn binary_payloads_pass_through_unchanged() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscriber().await.unwrap();
        sub.subscribe("a").await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sub.on_message(Box::new(move |_, payload| {
            sink.lock().unwrap().push(payload.to_vec());
        }));

        broker.publish_bytes("a", b"\xff\x01\x00").await.unwrap();
        sub.consume().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), [b"\xff\x01\x00".to_vec()]);
        assert_eq!(broker.published_to("a")[0].payload, b"\xff\x01\x00");
    }

    #[tokio::test]
    async fn subscribing_twice_delivers_once() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscriber().await.unwrap();
        sub.subscribe("a").await.unwrap();
        sub.subscribe("a").await.unwrap();
        assert_eq!(broker.subscription_count("a"), 1);

        broker.publish("a", "x").await.unwrap();
        assert_eq!(sub.consume().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn offline_fails_every_operation() {
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscriber().await.unwrap();
        sub.subscribe("a").await.unwrap();

        broker.set_offline(true);
        assert!(matches!(
            broker.publish("a", "x").await,
            Err(BrokerError::Publish(_))
        ));
        assert!(matches!(sub.consume().await, Err(BrokerError::Consume(_))));
        assert!(matches!(
            broker.subscriber().await,
            Err(BrokerError::Connection(_))
        ));
        assert!(broker.published().is_empty());

        broker.set_offline(false);
        broker.publish("a", "back").await.unwrap();
        assert_eq!(sub.consume().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn registry_membership() {
        let broker = InMemoryBroker::new();
        assert_eq!(broker.is_registered("COM3").await.unwrap(), Some(false));

        broker.register_device("COM3");
        assert_eq!(broker.is_registered("COM3").await.unwrap(), Some(true));

        broker.unregister_device("COM3");
        assert_eq!(broker.is_registered("COM3").await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn reset_clears_record() {
        let broker = InMemoryBroker::new();
        broker.publish("t", "d").await.unwrap();
        broker.reset();
        assert!(broker.published().is_empty());
    }
}
