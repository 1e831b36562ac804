//! # mooz
//!
//! Relay hub binary: loads settings, starts the HTTP/WebSocket server and
//! shuts it down gracefully on Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mooz_core::logging;
use mooz_server::metrics;
use mooz_server::{HubServer, ServerConfig};
use mooz_settings::MoozSettings;

/// mooz relay hub.
#[derive(Parser, Debug)]
#[command(name = "mooz", about = "WebSocket relay hub", version)]
struct Cli {
    /// Address to listen on (e.g. `0.0.0.0:8080` or `:8080`).
    #[arg(long)]
    bind: Option<String>,

    /// Directory of static UI assets.
    #[arg(long)]
    assets_dir: Option<PathBuf>,

    /// Serve HTTPS/WSS using the configured certificate and key.
    #[arg(long)]
    tls: bool,

    /// PEM certificate chain for TLS (implies `--tls`).
    #[arg(long)]
    tls_cert: Option<PathBuf>,

    /// PEM private key for TLS (implies `--tls`).
    #[arg(long)]
    tls_key: Option<PathBuf>,

    /// Settings file (defaults to `~/.mooz/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Command-line flags win over file and environment.
    fn apply(&self, settings: &mut MoozSettings) {
        if let Some(ref bind) = self.bind {
            settings.server.bind_addr = Some(bind.clone());
        }
        if let Some(ref dir) = self.assets_dir {
            settings.server.assets_dir = Some(dir.to_string_lossy().into_owned());
        }
        if let Some(ref cert) = self.tls_cert {
            settings.server.tls.cert_path = cert.to_string_lossy().into_owned();
        }
        if let Some(ref key) = self.tls_key {
            settings.server.tls.key_path = key.to_string_lossy().into_owned();
        }
        if self.tls || self.tls_cert.is_some() || self.tls_key.is_some() {
            settings.server.tls.enabled = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(mooz_settings::settings_path);
    let mut settings = mooz_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let mut server = HubServer::new(ServerConfig::from(&settings));
    if settings.server.metrics_enabled {
        let handle = metrics::install_recorder().context("Failed to install metrics recorder")?;
        server = server.with_metrics(handle);
    }

    let handle = server.listen().await.context("Failed to start server")?;
    let scheme = if settings.server.tls.enabled { "https" } else { "http" };
    tracing::info!(
        addr = %handle.local_addr(),
        heartbeat_ms = settings.hub.heartbeat_interval_ms,
        "mooz hub listening on {scheme}://{}",
        handle.local_addr()
    );

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    if !handle.shutdown().await {
        tracing::warn!("some sessions did not finish before the shutdown timeout");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => tracing::info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}
