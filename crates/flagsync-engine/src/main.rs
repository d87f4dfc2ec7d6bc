//! flagsync daemon
//!
//! Keeps a local feature-toggle replica in sync with a remote source and
//! logs the engine's event stream.

use clap::Parser;
use flagsync_core::prelude::*;
use flagsync_engine::Engine;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "flagsyncd")]
#[command(about = "Feature-toggle replica synchronization daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "FLAGSYNC_CONFIG")]
    config: Option<String>,

    /// Base URL of the remote feature endpoint
    #[arg(long, env = "FLAGSYNC_URL", default_value = "")]
    url: String,

    /// Application identity
    #[arg(long, env = "FLAGSYNC_APP_NAME", default_value = "")]
    app_name: String,

    /// Refresh interval in seconds (0 disables periodic polling)
    #[arg(long, env = "FLAGSYNC_REFRESH_SECONDS", default_value_t = 15)]
    refresh_seconds: u64,

    /// Backup snapshot directory
    #[arg(long, env = "FLAGSYNC_BACKUP_DIR")]
    backup_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<EngineConfig> {
        if let Some(path) = &self.config {
            return EngineConfig::load(Some(path))
                .map_err(|e| SyncError::config(format!("failed to load {path}: {e}")));
        }
        let mut config = EngineConfig::new(self.url, self.app_name);
        config.refresh_interval = Duration::from_secs(self.refresh_seconds);
        config.backup_dir = self.backup_dir;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting flagsyncd");

    let config = args.into_config()?;
    let engine = Engine::connect(config).await?;
    let mut events = engine.hub().subscribe();

    engine.start();
    info!("Engine started, entering main loop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(EngineEvent::Ready) => info!("Replica ready"),
                Ok(EngineEvent::Changed(replica)) => {
                    info!(toggles = replica.len(), "Replica changed")
                }
                Ok(EngineEvent::Unchanged) => {}
                Ok(EngineEvent::Error(e)) => error!(error = %e, kind = e.kind(), "Engine error"),
                Ok(EngineEvent::Warn(message)) => warn!(%message, "Engine warning"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event stream lagged")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    engine.stop();
    info!("Engine stopped gracefully");
    Ok(())
}
