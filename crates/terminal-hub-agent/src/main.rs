//! Terminal hub agent.
//!
//! Spawns a local shell and exposes it to the hub, either by dialing the
//! address the hub hands out or by tunneling the terminal over hub calls.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use terminal_hub_conn::{HubConn, RegistrationClient};
use terminal_hub_core::{TerminalStream, protocol::TerminalRegisterRequest, protocol::WindowSize};
use terminal_hub_pty::{BridgeEnd, ShellCommand, ShellProcess};
use terminal_hub_transport::{JsonLineClient, TcpTerminalStream};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let agent_id = cli.agent_id();
    let shell = match cli.shell.as_deref() {
        Some(line) => ShellCommand::parse(line)?,
        None => ShellCommand::detect(),
    };
    let window = window_size();

    let client = Arc::new(
        JsonLineClient::connect(&cli.hub)
            .await
            .with_context(|| format!("Failed to connect to hub at {}", cli.hub))?,
    );
    tracing::info!(%agent_id, hub = %client.peer_addr(), tunnel = cli.tunnel, "Agent starting");

    let end = if cli.tunnel {
        run_tunneled(&cli, &agent_id, client, &shell, window).await?
    } else {
        run_direct(&cli, &agent_id, client, &shell, window).await?
    };
    tracing::info!(?end, "Agent finished");
    Ok(())
}

/// Register the terminal, then dial the address the hub assigned.
async fn run_direct(
    cli: &Cli,
    agent_id: &str,
    client: Arc<JsonLineClient>,
    shell: &ShellCommand,
    window: WindowSize,
) -> Result<BridgeEnd> {
    let registration = RegistrationClient::new(client);
    let address = registration
        .register(TerminalRegisterRequest::new(
            agent_id,
            cli.address.clone(),
            Some(window),
        ))
        .await
        .context("Terminal registration failed")?;

    tracing::info!("Connecting to {address}");
    let stream = TcpTerminalStream::connect((address.host.as_str(), address.port))
        .await
        .with_context(|| format!("Failed to connect to {address}"))?;
    let stream: Arc<dyn TerminalStream> = Arc::new(stream);

    let process = ShellProcess::spawn(shell, window, cli.cwd.as_deref())?;
    let end = process.bridge(Arc::clone(&stream)).await?;
    if let Err(e) = stream.close().await {
        tracing::debug!(?e, "Terminal socket close failed");
    }
    Ok(end)
}

/// Carry the terminal over the hub's register, read, write and close calls.
async fn run_tunneled(
    cli: &Cli,
    agent_id: &str,
    client: Arc<JsonLineClient>,
    shell: &ShellCommand,
    window: WindowSize,
) -> Result<BridgeEnd> {
    let conn = Arc::new(HubConn::new(client, cli.conn_config(agent_id)));
    conn.register().await.context("Session registration failed")?;

    let process = ShellProcess::spawn(shell, window, cli.cwd.as_deref())?;
    let bridged = process.bridge(Arc::clone(&conn) as Arc<dyn TerminalStream>).await;

    if let Err(e) = conn.close().await {
        tracing::warn!(?e, "Failed to close hub session");
    }
    Ok(bridged?)
}

fn window_size() -> WindowSize {
    match crossterm::terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => WindowSize { cols, rows },
        _ => WindowSize::default(),
    }
}
