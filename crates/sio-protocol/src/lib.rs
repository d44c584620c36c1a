//! Wire contract for serial port bridges.
//!
//! Every serial port device is reachable through three broker channels
//! derived from its name, and the broker itself is addressed as
//! `tcp://<ip>:<port>`. Both bridges (clients) and routers (the process
//! owning the physical port) must agree on these strings byte for byte.

pub mod address;
pub mod channels;

pub use address::{AddressError, BrokerAddress, DEFAULT_BROKER_IP, DEFAULT_BROKER_PORT};
pub use channels::{
    ChannelKind, DEVICE_REGISTRY_KEY, NAMESPACE, ParsedChannel, SHUTDOWN_COMMAND, SerialChannels,
    parse_channel,
};
