//! LanChat coordinator entry point.
//!
//! Loads the configuration, starts the [`Coordinator`], and prints its event
//! feed to stdout until Ctrl+C, at which point every peer is told
//! `Server is stopping...` and disconnected.
//!
//! # Usage
//!
//! ```text
//! lanchat-server [OPTIONS]
//!
//!   --config    <PATH>   Config file          [default: platform config dir]
//!   --bind      <IP>     Bind address         [default: from config, 0.0.0.0]
//!   --port      <PORT>   TCP port             [default: from config, 5555]
//!   --log-level <LEVEL>  Fallback log level   [default: from config, info]
//! ```
//!
//! Every option can also be set through the environment:
//!
//! | Variable            | Option        |
//! |---------------------|---------------|
//! | `LANCHAT_CONFIG`    | `--config`    |
//! | `LANCHAT_BIND`      | `--bind`      |
//! | `LANCHAT_PORT`      | `--port`      |
//! | `LANCHAT_LOG_LEVEL` | `--log-level` |
//!
//! `RUST_LOG`, when set, takes precedence over `--log-level`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lanchat_server::infrastructure::network::{Coordinator, CoordinatorEvent};
use lanchat_server::infrastructure::storage::config::{
    load_config, load_config_from, ConfigError, ServerConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LanChat coordinator.
///
/// Hands each connecting peer the session key and relays every encrypted
/// message to all other peers.
#[derive(Debug, Parser)]
#[command(name = "lanchat-server", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "LANCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// IPv4 address to listen on; overrides `network.bind_address`.
    #[arg(long, env = "LANCHAT_BIND")]
    bind: Option<String>,

    /// TCP port to listen on; overrides `network.port`.
    #[arg(long, env = "LANCHAT_PORT")]
    port: Option<u16>,

    /// Log level used when `RUST_LOG` is unset; overrides `server.log_level`.
    #[arg(long, env = "LANCHAT_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the file configuration and applies command-line overrides.
    fn resolve_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => match load_config() {
                Ok(config) => config,
                // No home directory: run on defaults rather than refuse to start.
                Err(ConfigError::NoPlatformConfigDir) => ServerConfig::default(),
                Err(e) => return Err(e).context("failed to load config"),
            },
        };

        if let Some(bind) = &self.bind {
            config.network.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(level) = &self.log_level {
            config.server.log_level = level.clone();
        }
        Ok(config)
    }
}

// ── Event rendering ───────────────────────────────────────────────────────────

/// Turns a coordinator event into the line shown to the operator.
fn render_event(event: &CoordinatorEvent) -> Option<String> {
    match event {
        CoordinatorEvent::Listening { local_addr, lan_ip } => Some(format!(
            "Server started...\nServer IP: {lan_ip} (listening on {local_addr})"
        )),
        CoordinatorEvent::PeerConnected { addr, .. } => Some(format!("Connected with {addr}")),
        CoordinatorEvent::MessageRelayed { text, .. } => Some(text.clone()),
        CoordinatorEvent::Stopped => Some("Server stopped...".to_string()),
        CoordinatorEvent::DecodeFailed { .. } | CoordinatorEvent::PeerDisconnected { .. } => None,
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let coordinator = Coordinator::new(config.to_coordinator_config()?);

    // Subscribe before start() so the Listening event is not missed.
    let mut events = coordinator.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = render_event(&event) {
                        println!("{line}");
                    }
                    if event == CoordinatorEvent::Stopped {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("event feed skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    coordinator
        .start()
        .await
        .context("failed to start coordinator")?;
    info!("press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("received Ctrl+C, stopping");

    coordinator.stop().await?;
    printer.await.context("event printer task failed")?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
