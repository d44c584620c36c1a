//! Serial client: the application side of a serial port bridge.
//!
//! Text written with `send` is published on the device's write channel and
//! commands on its command channel; the router owning the physical port
//! publishes device output on the read channel, which every client
//! subscribes to exactly once, at construction.
//!
//! Payloads are bytes on the wire. `send_bytes` and `on_receive_bytes` carry
//! them unchanged; `send` and `on_receive` are the text view, where inbound
//! bytes that are not UTF-8 show up as U+FFFD.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sio_broker::{BrokerConfig, BrokerError, BrokerResult, SharedBroker, Subscriber};
use sio_protocol::{BrokerAddress, DEFAULT_BROKER_IP, DEFAULT_BROKER_PORT, SHUTDOWN_COMMAND, SerialChannels};
use tokio::sync::Mutex;

use crate::config::{BridgeConfig, ConsumeErrorPolicy};
use crate::event::Event;
use crate::stats::{BridgeStats, StatsRecorder};
use crate::worker::BackgroundWorker;

/// Default pause between two background drains.
pub const DEFAULT_LISTEN_INTERVAL: Duration = Duration::from_millis(10);

/// State shared between the client and its background listener.
struct Inner {
    channels: SerialChannels,
    broker: SharedBroker,
    subscriber: Mutex<Option<Box<dyn Subscriber>>>,
    on_receive: Arc<Event<str>>,
    on_receive_bytes: Arc<Event<[u8]>>,
    stats: Arc<StatsRecorder>,
    stop_on_consume_error: AtomicBool,
}

impl Inner {
    async fn listen(&self) -> BrokerResult<usize> {
        let mut subscriber = self.subscriber.lock().await;
        let Some(subscriber) = subscriber.as_mut() else {
            return Ok(0);
        };

        subscriber.consume().await.inspect_err(|_| {
            self.stats.record_consume_error();
        })
    }

    /// One background cycle: drain, then apply the consume error policy.
    async fn poll(&self) -> ControlFlow<()> {
        let Err(e) = self.listen().await else {
            return ControlFlow::Continue(());
        };

        if self.stop_on_consume_error.load(Ordering::Relaxed) {
            tracing::error!(
                device = self.channels.device(),
                error = %e,
                "consume failed, stopping background listener"
            );
            ControlFlow::Break(())
        } else {
            tracing::warn!(
                device = self.channels.device(),
                error = %e,
                "consume failed, retrying on next interval"
            );
            ControlFlow::Continue(())
        }
    }
}

/// Client for one serial port device.
///
/// Cheap operations (`send`, `send_command`, `listen`) may be called from
/// any task, including while the background listener runs. Observers
/// registered on [`on_receive`](Self::on_receive) run on whichever task
/// drains the subscription and must not call [`listen`](Self::listen)
/// themselves.
pub struct SerialClient {
    inner: Arc<Inner>,
    listener: BackgroundWorker,
}

impl SerialClient {
    /// Bind `device` and open a new Redis connection to `tcp://<ip>:<port>`.
    pub async fn connect(device: impl Into<String>, port: u16, ip: &str) -> BrokerResult<Self> {
        let config = BrokerConfig::redis(&BrokerAddress::new(ip, port));
        let broker = sio_broker::connect(&config).await?;
        Self::with_connection(device, broker).await
    }

    /// Bind `device` through the broker at `tcp://127.0.0.1:6379`.
    pub async fn connect_default(device: impl Into<String>) -> BrokerResult<Self> {
        Self::connect(device, DEFAULT_BROKER_PORT, DEFAULT_BROKER_IP).await
    }

    /// Build a client, and its own broker connection, from configuration.
    pub async fn from_config(config: &BridgeConfig) -> BrokerResult<Self> {
        let broker = sio_broker::connect(&config.broker).await?;
        Self::with_config(config, broker).await
    }

    /// Build a client from configuration on an existing connection. The
    /// `broker` section of `config` is not consulted.
    pub async fn with_config(config: &BridgeConfig, broker: SharedBroker) -> BrokerResult<Self> {
        if config.require_registered
            && broker.is_registered(&config.device).await? == Some(false)
        {
            return Err(BrokerError::DeviceUnavailable(config.device.clone()));
        }

        let client = Self::with_connection(config.device.clone(), broker).await?;
        client.set_listen_interval(config.listen_interval());
        client.set_consume_error_policy(config.on_consume_error);
        Ok(client)
    }

    /// Bind `device` reusing an existing broker connection.
    ///
    /// A dedicated subscriber is still created from the connection, since a
    /// subscription belongs to exactly one client.
    pub async fn with_connection(
        device: impl Into<String>,
        broker: SharedBroker,
    ) -> BrokerResult<Self> {
        let channels = SerialChannels::for_device(device);
        let on_receive: Arc<Event<str>> = Arc::new(Event::new());
        let on_receive_bytes: Arc<Event<[u8]>> = Arc::new(Event::new());
        let stats = Arc::new(StatsRecorder::default());

        let mut subscriber = broker.subscriber().await?;
        subscriber.subscribe(channels.read()).await?;

        let text_event = Arc::clone(&on_receive);
        let bytes_event = Arc::clone(&on_receive_bytes);
        let recorder = Arc::clone(&stats);
        subscriber.on_message(Box::new(move |_channel, payload| {
            recorder.record_received();
            bytes_event.trigger(payload);
            if !text_event.is_empty() {
                text_event.trigger(&String::from_utf8_lossy(payload));
            }
        }));

        tracing::info!(
            device = channels.device(),
            channel = channels.read(),
            "serial client bound"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                channels,
                broker,
                subscriber: Mutex::new(Some(subscriber)),
                on_receive,
                on_receive_bytes,
                stats,
                stop_on_consume_error: AtomicBool::new(false),
            }),
            listener: BackgroundWorker::new(DEFAULT_LISTEN_INTERVAL),
        })
    }

    pub fn device(&self) -> &str {
        self.inner.channels.device()
    }

    pub fn channels(&self) -> &SerialChannels {
        &self.inner.channels
    }

    /// The broker connection, for building more clients on it.
    pub fn connection(&self) -> SharedBroker {
        Arc::clone(&self.inner.broker)
    }

    /// Observers invoked with every text received from the device.
    pub fn on_receive(&self) -> &Event<str> {
        &self.inner.on_receive
    }

    /// Observers invoked with the raw payload of every message received
    /// from the device. They run before the text observers.
    pub fn on_receive_bytes(&self) -> &Event<[u8]> {
        &self.inner.on_receive_bytes
    }

    // ── Outbound ──────────────────────────────────────────────

    /// Send text to the serial port.
    pub async fn send(&self, text: &str) -> BrokerResult<()> {
        self.send_bytes(text.as_bytes()).await
    }

    /// Send raw bytes to the serial port.
    pub async fn send_bytes(&self, data: &[u8]) -> BrokerResult<()> {
        self.inner
            .broker
            .publish_bytes(self.inner.channels.write(), data)
            .await?;
        self.inner.stats.record_sent();
        tracing::debug!(device = self.device(), bytes = data.len(), "sent");
        Ok(())
    }

    /// Send a command to the router owning the serial port.
    pub async fn send_command(&self, command: &str) -> BrokerResult<()> {
        self.inner
            .broker
            .publish(self.inner.channels.command(), command)
            .await?;
        self.inner.stats.record_command();
        tracing::debug!(device = self.device(), command, "command sent");
        Ok(())
    }

    /// Ask the router to release the device and exit.
    pub async fn shutdown_router(&self) -> BrokerResult<()> {
        self.send_command(SHUTDOWN_COMMAND).await
    }

    /// Whether a router has registered this device. `None` when the broker
    /// keeps no registry.
    pub async fn is_available(&self) -> BrokerResult<Option<bool>> {
        self.inner.broker.is_registered(self.device()).await
    }

    // ── Inbound ───────────────────────────────────────────────

    /// Drain the subscription once, dispatching every pending message to
    /// the observers before returning. Returns the number dispatched; a
    /// closed client always returns 0.
    pub async fn listen(&self) -> BrokerResult<usize> {
        self.inner.listen().await
    }

    /// Start draining in the background every listen interval. Must be
    /// called inside a Tokio runtime. Returns `false` if already running.
    pub fn start_listening(&self) -> bool {
        let inner = Arc::clone(&self.inner);
        let started = self.listener.start(move || {
            let inner = Arc::clone(&inner);
            async move { inner.poll().await }
        });

        if started {
            tracing::info!(
                device = self.device(),
                interval = ?self.listen_interval(),
                "background listener started"
            );
        }
        started
    }

    /// Stop the background listener, letting a drain in progress finish.
    /// Returns `false` if it was not started.
    pub async fn stop_listening(&self) -> bool {
        let stopped = self.listener.stop().await;
        if stopped {
            tracing::info!(device = self.device(), "background listener stopped");
        }
        stopped
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_running()
    }

    pub fn listen_interval(&self) -> Duration {
        self.listener.interval()
    }

    /// Change the background pause; applies from the next cycle.
    pub fn set_listen_interval(&self, interval: Duration) {
        self.listener.set_interval(interval);
    }

    pub fn consume_error_policy(&self) -> ConsumeErrorPolicy {
        if self.inner.stop_on_consume_error.load(Ordering::Relaxed) {
            ConsumeErrorPolicy::Stop
        } else {
            ConsumeErrorPolicy::Continue
        }
    }

    pub fn set_consume_error_policy(&self, policy: ConsumeErrorPolicy) {
        self.inner
            .stop_on_consume_error
            .store(policy == ConsumeErrorPolicy::Stop, Ordering::Relaxed);
    }

    /// Stop listening and drop the subscription. Sending still works;
    /// `listen` becomes a no-op.
    pub async fn close(&self) {
        self.stop_listening().await;
        if self.inner.subscriber.lock().await.take().is_some() {
            tracing::info!(device = self.device(), "serial client closed");
        }
    }

    pub fn stats(&self) -> BridgeStats {
        self.inner.stats.snapshot()
    }
}
