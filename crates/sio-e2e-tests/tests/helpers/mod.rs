//! Shared test harness for end-to-end tests.
//!
//! Wires serial clients and a stand-in router through one `InMemoryBroker`,
//! exercising the real client code paths without a broker server.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use sio_broker::{Broker, InMemoryBroker, SharedBroker, Subscriber};
use sio_client::SerialClient;
use sio_protocol::SerialChannels;

/// Stand-in for the router owning a physical port: records what clients
/// write and command, and can play device output onto the read channel.
pub struct RouterStub {
    broker: Arc<InMemoryBroker>,
    channels: SerialChannels,
    subscriber: Box<dyn Subscriber>,
    inbox: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl RouterStub {
    pub async fn attach(broker: &Arc<InMemoryBroker>, device: &str) -> Self {
        let channels = SerialChannels::for_device(device);
        let mut subscriber = broker.subscriber().await.unwrap();
        subscriber.subscribe(channels.write()).await.unwrap();
        subscriber.subscribe(channels.command()).await.unwrap();

        let inbox = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&inbox);
        subscriber.on_message(Box::new(move |channel, payload| {
            sink.lock()
                .unwrap()
                .push((channel.to_string(), payload.to_vec()));
        }));

        Self {
            broker: Arc::clone(broker),
            channels,
            subscriber,
            inbox,
        }
    }

    /// Drain pending client traffic as raw `(channel, payload)` pairs.
    pub async fn drain_raw(&mut self) -> Vec<(String, Vec<u8>)> {
        self.subscriber.consume().await.unwrap();
        std::mem::take(&mut *self.inbox.lock().unwrap())
    }

    /// Drain pending client traffic; returns `(channel, text)` pairs.
    pub async fn drain(&mut self) -> Vec<(String, String)> {
        self.drain_raw()
            .await
            .into_iter()
            .map(|(channel, payload)| (channel, String::from_utf8_lossy(&payload).into_owned()))
            .collect()
    }

    /// Raw payloads clients wrote to the device since the last drain.
    pub async fn written_raw(&mut self) -> Vec<Vec<u8>> {
        let write = self.channels.write().to_string();
        self.drain_raw()
            .await
            .into_iter()
            .filter(|(channel, _)| *channel == write)
            .map(|(_, payload)| payload)
            .collect()
    }

    /// Text clients wrote to the device since the last drain.
    pub async fn written(&mut self) -> Vec<String> {
        self.written_raw()
            .await
            .iter()
            .map(|payload| String::from_utf8_lossy(payload).into_owned())
            .collect()
    }

    /// Publish device output on the read channel.
    pub async fn emit(&self, text: &str) {
        self.emit_bytes(text.as_bytes()).await;
    }

    pub async fn emit_bytes(&self, data: &[u8]) {
        self.broker
            .publish_bytes(self.channels.read(), data)
            .await
            .unwrap();
    }

    /// Loop every written payload back, byte for byte, as device output.
    pub async fn echo(&mut self) -> usize {
        let written = self.written_raw().await;
        for data in &written {
            self.emit_bytes(data).await;
        }
        written.len()
    }
}

pub async fn client(broker: &Arc<InMemoryBroker>, device: &str) -> SerialClient {
    let shared: SharedBroker = broker.clone();
    SerialClient::with_connection(device, shared).await.unwrap()
}

/// Register an observer collecting every received text.
pub fn collect(client: &SerialClient) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client
        .on_receive()
        .subscribe(move |text: &str| sink.lock().unwrap().push(text.to_string()));
    seen
}

pub fn snapshot(seen: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    seen.lock().unwrap().clone()
}
