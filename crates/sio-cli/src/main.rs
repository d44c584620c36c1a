//! serial-io: send to and receive from a serial port device through the
//! message broker its router is attached to.

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use sio_cli::args::{Cli, Command};
use sio_cli::{commands, config};
use sio_client::SerialClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries device output.
    if cli.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    // ── Load config ─────────────────────────────────────────────
    let config = config::resolve(&cli)?;
    tracing::info!(
        device = %config.device,
        broker = %config.broker.address(),
        backend = ?config.broker.backend,
        "config loaded"
    );

    // ── Connect ─────────────────────────────────────────────────
    let client = SerialClient::from_config(&config).await?;

    // ── Dispatch ────────────────────────────────────────────────
    let result = run(cli.command, &client).await;
    client.close().await;
    result
}

async fn run(command: Command, client: &SerialClient) -> anyhow::Result<()> {
    match command {
        Command::Send { text, newline } => commands::send(client, &text, newline).await?,
        Command::Command { command } => commands::command(client, &command).await?,
        Command::Shutdown => commands::shutdown(client).await?,
        Command::Status => commands::status(client, &mut std::io::stdout()).await?,
        Command::Monitor => {
            commands::attach_printer(client, std::io::stdout());
            client.start_listening();
            tokio::signal::ctrl_c().await?;
            tracing::info!("shutdown signal received");
        }
        Command::Terminal => {
            commands::attach_printer(client, std::io::stdout());
            client.start_listening();

            let stdin = BufReader::new(tokio::io::stdin());
            tokio::select! {
                sent = commands::forward_lines(client, stdin) => {
                    let sent = sent?;
                    tracing::info!(lines = sent, "stdin closed");
                }
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    tracing::info!("shutdown signal received");
                }
            }
        }
    }
    Ok(())
}
