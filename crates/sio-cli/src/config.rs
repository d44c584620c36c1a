//! Configuration loading: TOML file first, command line flags on top.

use std::path::Path;

use anyhow::Context;
use sio_broker::BackendKind;
use sio_client::BridgeConfig;

use crate::args::{Backend, Cli};

/// Load a bridge config from a TOML file path.
pub fn from_file(path: &Path) -> anyhow::Result<BridgeConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config '{}'", path.display()))?;
    let config: BridgeConfig = toml::from_str(&contents)
        .with_context(|| format!("invalid config '{}'", path.display()))?;
    Ok(config)
}

/// Resolve the effective configuration for a command line invocation.
pub fn resolve(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => from_file(path)?,
        None => {
            let device = cli
                .device
                .clone()
                .context("--device is required when no --config file is given")?;
            BridgeConfig::new(device)
        }
    };

    apply_overrides(&mut config, cli);
    Ok(config)
}

fn apply_overrides(config: &mut BridgeConfig, cli: &Cli) {
    if let Some(device) = &cli.device {
        config.device = device.clone();
    }
    if let Some(address) = &cli.broker {
        config.broker.host = address.ip.clone();
        config.broker.port = address.port;
    }
    if let Some(host) = &cli.host {
        config.broker.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.broker.port = port;
    }
    if let Some(backend) = cli.backend {
        config.broker.backend = match backend {
            Backend::Redis => BackendKind::Redis,
            Backend::Mqtt => BackendKind::Mqtt,
        };
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.listen_interval_ms = interval_ms;
    }
    if cli.require_registered {
        config.require_registered = true;
    }
}
