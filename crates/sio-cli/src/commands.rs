//! Handlers for each subcommand.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use sio_client::{ObserverId, SerialClient};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub async fn send(client: &SerialClient, text: &str, newline: bool) -> anyhow::Result<()> {
    if newline {
        client.send(&format!("{text}\n")).await?;
    } else {
        client.send(text).await?;
    }
    Ok(())
}

pub async fn command(client: &SerialClient, command: &str) -> anyhow::Result<()> {
    client.send_command(command).await?;
    Ok(())
}

pub async fn shutdown(client: &SerialClient) -> anyhow::Result<()> {
    client.shutdown_router().await?;
    tracing::info!(device = client.device(), "shutdown requested");
    Ok(())
}

/// Print the device's registration state.
pub async fn status(client: &SerialClient, out: &mut impl Write) -> anyhow::Result<()> {
    let state = match client.is_available().await? {
        Some(true) => "registered",
        Some(false) => "not registered",
        None => "unknown (broker keeps no device registry)",
    };
    writeln!(out, "{}: {state}", client.device())?;
    Ok(())
}

/// Copy every received payload byte for byte to `out`. Device output
/// carries its own line endings, so nothing is added.
pub fn attach_printer<W>(client: &SerialClient, out: W) -> ObserverId
where
    W: Write + Send + 'static,
{
    let out = Arc::new(Mutex::new(out));
    client.on_receive_bytes().subscribe(move |data: &[u8]| {
        let mut out = out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = out.write_all(data).and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "failed to write received data");
        }
    })
}

/// Send each line read from `input`, newline included, until EOF. Lines
/// are forwarded as raw bytes. Returns the number of lines sent.
pub async fn forward_lines<R>(client: &SerialClient, mut input: R) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut sent = 0;

    loop {
        line.clear();
        if input.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        client.send_bytes(&line).await?;
        sent += 1;
    }

    Ok(sent)
}
