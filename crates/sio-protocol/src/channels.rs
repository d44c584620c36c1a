//! Channel name builders and parsers for the serial port hierarchy.
//!
//! Channel structure:
//! ```text
//! serial_ports/{device}/read      router -> clients (data from the device)
//! serial_ports/{device}/write     clients -> router (data to the device)
//! serial_ports/{device}/command   clients -> router (control commands)
//! ```
//!
//! Device names are opaque. They are never validated, so a name containing
//! `/` simply produces a deeper channel name.

use std::fmt;

/// Namespace shared by every serial port channel.
pub const NAMESPACE: &str = "serial_ports";

/// Key of the set in which routers announce the devices they own.
pub const DEVICE_REGISTRY_KEY: &str = "serial_ports";

/// Command text that asks a router to release its device and exit.
pub const SHUTDOWN_COMMAND: &str = "shutdown";

// ─── Channel builders ───

pub fn read(device: &str) -> String {
    format!("{NAMESPACE}/{device}/read")
}

pub fn write(device: &str) -> String {
    format!("{NAMESPACE}/{device}/write")
}

pub fn command(device: &str) -> String {
    format!("{NAMESPACE}/{device}/command")
}

// ─── Channel kinds ───

/// The role a channel plays for its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Read,
    Write,
    Command,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Command => "command",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "command" => Some(Self::Command),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Channel triple ───

/// The three channel names bound to one device.
///
/// Built once from the device name and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialChannels {
    device: String,
    read: String,
    write: String,
    command: String,
}

impl SerialChannels {
    pub fn for_device(device: impl Into<String>) -> Self {
        let device = device.into();
        Self {
            read: read(&device),
            write: write(&device),
            command: command(&device),
            device,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Channel the router publishes device output on.
    pub fn read(&self) -> &str {
        &self.read
    }

    /// Channel whose payloads the router writes to the device.
    pub fn write(&self) -> &str {
        &self.write
    }

    /// Channel for router control commands.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn get(&self, kind: ChannelKind) -> &str {
        match kind {
            ChannelKind::Read => &self.read,
            ChannelKind::Write => &self.write,
            ChannelKind::Command => &self.command,
        }
    }
}

// ─── Channel parsing ───

/// Parsed serial port channel components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChannel {
    pub device: String,
    pub kind: ChannelKind,
}

/// Parse a channel name into its device and kind.
/// Returns `None` if the name is outside the serial port namespace.
pub fn parse_channel(channel: &str) -> Option<ParsedChannel> {
    let rest = channel.strip_prefix(NAMESPACE)?.strip_prefix('/')?;
    let (device, suffix) = rest.rsplit_once('/')?;
    if device.is_empty() {
        return None;
    }

    Some(ParsedChannel {
        device: device.to_string(),
        kind: ChannelKind::from_suffix(suffix)?,
    })
}
