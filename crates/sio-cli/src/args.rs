//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sio_protocol::BrokerAddress;

/// Talk to a serial port device through the message broker.
#[derive(Parser, Debug, Clone)]
#[command(name = "serial-io", version, about)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial port device name (e.g. ttyUSB0, COM3).
    #[arg(short, long)]
    pub device: Option<String>,

    /// Broker address as `tcp://<ip>:<port>`, `<ip>:<port>` or `<ip>`.
    #[arg(short, long, conflicts_with_all = ["host", "port"])]
    pub broker: Option<BrokerAddress>,

    /// Broker IP address or hostname.
    #[arg(long)]
    pub host: Option<String>,

    /// Broker port.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Broker client backend.
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Pause between background drains, in milliseconds.
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Fail unless a router has registered the device.
    #[arg(long)]
    pub require_registered: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Redis,
    Mqtt,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish text on the device's write channel.
    Send {
        text: String,
        /// Append a line feed.
        #[arg(short = 'n', long)]
        newline: bool,
    },
    /// Publish a command on the device's command channel.
    Command { command: String },
    /// Ask the router to release the device and exit.
    Shutdown,
    /// Print everything the device sends until interrupted.
    Monitor,
    /// Monitor, and forward stdin lines to the device.
    Terminal,
    /// Report whether a router has registered the device.
    Status,
}
