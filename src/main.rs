//! Session Relay - Entry Point
//!
//! Loads the configuration, starts the session sweep and serves WebSocket
//! transports until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_relay::{ConfigService, RelayServer, RelayState, SshConnector};

/// Remote session relay: WebSocket front end for SSH shells and SFTP.
#[derive(Debug, Parser)]
#[command(name = "session-relay", version, about)]
struct Cli {
    /// Path to config.json (defaults to ~/.session-relay/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config file
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config_service = match cli.config {
        Some(path) => ConfigService::open(path)?,
        None => ConfigService::new()?,
    };
    if let Some(listen) = cli.listen.as_deref() {
        config_service.override_listen_addr(listen)?;
    }
    info!(path = %config_service.path().display(), "configuration loaded");

    let relay = Arc::new(RelayState::new(
        config_service.into_config(),
        Arc::new(SshConnector::new()),
    ));
    relay.start();

    let server = RelayServer::bind(Arc::clone(&relay)).await?;
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    server.run(cancel).await;
    relay.shutdown().await;
    info!("relay stopped");
    Ok(())
}
