//! Sshgate - SOCKS5 Gateway over SSH
//!
//! This is the main entry point for the Sshgate application.

use anyhow::{Context, Result};
use clap::Parser;
use sshgate::config::{load_config, Config};
use sshgate::gateway::run_gateway;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Sshgate - local SOCKS5 gateway tunnelling TCP and UDP through SSH
#[derive(Parser, Debug)]
#[command(name = "sshgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SSH server host
    #[arg(long)]
    host: Option<String>,

    /// SSH server port
    #[arg(long)]
    port: Option<u16>,

    /// SSH username
    #[arg(short, long)]
    user: Option<String>,

    /// SSH password
    #[arg(short, long, env = "SSHGATE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Local SOCKS5 port
    #[arg(long)]
    local_port: Option<u16>,

    /// UDP gateway port on the SSH server side
    #[arg(long)]
    udpgw_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

impl Args {
    /// Build the configuration: file first, then command line overrides
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => Config::default(),
        };

        if let Some(host) = self.host {
            config.tunnel.host = host;
        }
        if let Some(port) = self.port {
            config.tunnel.port = port;
        }
        if let Some(user) = self.user {
            config.tunnel.username = user;
        }
        if let Some(password) = self.password {
            config.tunnel.password = password;
        }
        if let Some(port) = self.local_port {
            config.socks.port = port;
        }
        if let Some(port) = self.udpgw_port {
            config.udpgw.remote_port = port;
        }

        config
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid configuration")?;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    if let Some(path) = &args.config {
        info!("Configuration loaded from: {:?}", path);
    }
    let config = args.into_config()?;

    info!("Sshgate v{}", sshgate::VERSION);
    info!("SSH server: {}", config.tunnel.server_addr());
    info!("SOCKS5 endpoint: {}", config.socks.bind_addr());
    if config.udpgw.enabled {
        info!(
            "UDP gateway: {}:{}",
            config.udpgw.remote_host, config.udpgw.remote_port
        );
    }

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    run_gateway(config, shutdown_rx).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!("Failed to setup SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    // On Windows, only handle Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl+C, shutting down...");
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
