//! End-to-end scenarios: client and router stub talking through one broker.

mod helpers;

use std::sync::Arc;

use sio_broker::{Broker, BrokerError, InMemoryBroker, Subscriber};
use sio_client::{BridgeConfig, SerialClient};
use sio_protocol::{ChannelKind, parse_channel};

use helpers::{RouterStub, client, collect, snapshot};

#[tokio::test]
async fn command_reaches_router_on_command_channel() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut router = RouterStub::attach(&broker, "COM3").await;
    let client = client(&broker, "COM3").await;

    client.send_command("RESET").await.unwrap();

    let traffic = router.drain().await;
    assert_eq!(
        traffic,
        [("serial_ports/COM3/command".to_string(), "RESET".to_string())]
    );

    let parsed = parse_channel(&traffic[0].0).unwrap();
    assert_eq!(parsed.device, "COM3");
    assert_eq!(parsed.kind, ChannelKind::Command);
}

#[tokio::test]
async fn write_is_delivered_exactly_once() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut router = RouterStub::attach(&broker, "COM3").await;
    let client = client(&broker, "COM3").await;

    client.send("hello").await.unwrap();

    assert_eq!(router.written().await, ["hello"]);
    assert!(router.drain().await.is_empty());
}

#[tokio::test]
async fn device_output_arrives_in_publish_order() {
    let broker = Arc::new(InMemoryBroker::new());
    let router = RouterStub::attach(&broker, "COM3").await;
    let client = client(&broker, "COM3").await;
    let seen = collect(&client);

    for line in ["boot", "ready", "> "] {
        router.emit(line).await;
    }

    assert_eq!(client.listen().await.unwrap(), 3);
    assert_eq!(snapshot(&seen), ["boot", "ready", "> "]);
}

#[tokio::test]
async fn echo_round_trip() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut router = RouterStub::attach(&broker, "ttyUSB0").await;
    let client = client(&broker, "ttyUSB0").await;
    let seen = collect(&client);

    client.send("AT\r\n").await.unwrap();
    client.send("ATI\r\n").await.unwrap();
    assert_eq!(router.echo().await, 2);

    client.listen().await.unwrap();
    assert_eq!(snapshot(&seen), ["AT\r\n", "ATI\r\n"]);

    let stats = client.stats();
    assert_eq!(stats.messages_sent, 2);
    assert_eq!(stats.messages_received, 2);
    assert!(stats.last_activity.is_some());
}

#[tokio::test]
async fn every_client_of_a_device_sees_its_output() {
    let broker = Arc::new(InMemoryBroker::new());
    let router = RouterStub::attach(&broker, "COM3").await;
    let first = client(&broker, "COM3").await;
    let second = client(&broker, "COM3").await;
    let first_seen = collect(&first);
    let second_seen = collect(&second);

    router.emit("tick").await;
    first.listen().await.unwrap();
    second.listen().await.unwrap();

    assert_eq!(snapshot(&first_seen), ["tick"]);
    assert_eq!(snapshot(&second_seen), ["tick"]);
}

#[tokio::test]
async fn shutdown_is_sent_as_router_command() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut router = RouterStub::attach(&broker, "COM3").await;
    let client = client(&broker, "COM3").await;

    client.shutdown_router().await.unwrap();

    let traffic = router.drain().await;
    assert_eq!(traffic.len(), 1);
    assert_eq!(traffic[0].1, "shutdown");
}

#[tokio::test]
async fn outside_observer_sees_client_traffic() {
    let broker = Arc::new(InMemoryBroker::new());
    let client = client(&broker, "COM3").await;

    let mut tap = broker.subscriber().await.unwrap();
    tap.subscribe("serial_ports/COM3/write").await.unwrap();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    tap.on_message(Box::new(move |_, payload| {
        sink.lock().unwrap().push(String::from_utf8_lossy(payload).into_owned());
    }));

    client.send("hello").await.unwrap();
    client.send_command("RESET").await.unwrap();

    assert_eq!(tap.consume().await.unwrap(), 1);
    assert_eq!(*seen.lock().unwrap(), ["hello"]);
}

#[tokio::test]
async fn availability_tracks_router_registration() {
    let broker = Arc::new(InMemoryBroker::new());
    let client = client(&broker, "COM3").await;
    assert_eq!(client.is_available().await.unwrap(), Some(false));

    broker.register_device("COM3");
    assert_eq!(client.is_available().await.unwrap(), Some(true));

    broker.unregister_device("COM3");
    assert_eq!(client.is_available().await.unwrap(), Some(false));
}

#[tokio::test]
async fn binary_device_traffic_survives_the_round_trip() {
    let broker = Arc::new(InMemoryBroker::new());
    let mut router = RouterStub::attach(&broker, "ttyS0").await;
    let client = client(&broker, "ttyS0").await;

    let raw = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&raw);
    client
        .on_receive_bytes()
        .subscribe(move |data: &[u8]| sink.lock().unwrap().push(data.to_vec()));

    // A Modbus RTU frame: not valid UTF-8.
    let frame: &[u8] = &[0x01, 0x03, 0x00, 0x00, 0x00, 0x0a, 0xc5, 0xcd];
    client.send_bytes(frame).await.unwrap();
    assert_eq!(router.echo().await, 1);

    client.listen().await.unwrap();
    assert_eq!(*raw.lock().unwrap(), [frame.to_vec()]);
}

#[tokio::test]
async fn configured_client_requires_a_registered_router() {
    let broker = Arc::new(InMemoryBroker::new());
    let config = BridgeConfig {
        require_registered: true,
        ..BridgeConfig::new("COM3")
    };

    let refused = SerialClient::with_config(&config, broker.clone()).await;
    assert!(matches!(refused, Err(BrokerError::DeviceUnavailable(_))));

    let mut router = RouterStub::attach(&broker, "COM3").await;
    broker.register_device("COM3");
    let client = SerialClient::with_config(&config, broker.clone())
        .await
        .unwrap();

    client.send("ready?").await.unwrap();
    assert_eq!(router.written().await, ["ready?"]);
}
