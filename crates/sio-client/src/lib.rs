//! Serial port client that talks to a device through a message broker.
//!
//! A `SerialClient` binds a device name to its read/write/command channels,
//! keeps one subscription on the read channel, and forwards inbound text to
//! the observers registered on `on_receive()`. Inbound messages are only
//! dispatched when the subscription is drained, either manually through
//! `listen()` or by the background listener started with
//! `start_listening()`.

pub mod client;
pub mod config;
pub mod event;
pub mod stats;
pub mod worker;

pub use client::{DEFAULT_LISTEN_INTERVAL, SerialClient};
pub use config::{BridgeConfig, ConsumeErrorPolicy};
pub use event::{Event, ObserverId};
pub use stats::BridgeStats;
pub use worker::{AtomicDuration, BackgroundWorker};
