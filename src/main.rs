//! frame-monitor: serve a continuously overwritten image file over HTTP
//!
//! Run with: frame-monitor [--port 8080] [--file /tmp/output.jpg] [--debug]
//!
//! Endpoints:
//!   /          viewer page
//!   /image     latest frame (supports If-None-Match)
//!   /video     live multipart/x-mixed-replace stream
//!   /health    {"status": "ok" | "no_image", "timestamp": ...}

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use frame_monitor::{FrameServer, FrameStore, ServerConfig, SourceWatcher, WatcherConfig};

#[derive(Debug, Parser)]
#[command(name = "frame-monitor", version, about = "Serve a continuously overwritten image file as a snapshot endpoint and a live stream")]
struct Cli {
    /// HTTP server port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Path to the image file to monitor
    #[arg(long, default_value = "/tmp/output.jpg")]
    file: PathBuf,

    /// How often to check the file for changes, in milliseconds
    #[arg(long, default_value_t = 33)]
    poll_interval_ms: u64,

    /// Time between frames on the live stream, in milliseconds
    #[arg(long, default_value_t = 33)]
    frame_interval_ms: u64,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("frame_monitor={level}").parse()?),
        )
        .with_target(cli.debug)
        .init();

    let store = Arc::new(FrameStore::new());

    let watcher_config =
        WatcherConfig::new(&cli.file).poll_interval(Duration::from_millis(cli.poll_interval_ms));
    let mut watcher = SourceWatcher::from_config(&watcher_config, Arc::clone(&store));
    watcher.start().await;

    let config = ServerConfig::with_addr(SocketAddr::new(cli.bind, cli.port))
        .max_connections(cli.max_connections)
        .frame_interval(Duration::from_millis(cli.frame_interval_ms));

    tracing::info!(
        port = cli.port,
        file = %cli.file.display(),
        "Starting frame monitor"
    );

    let server = FrameServer::new(config, store);
    let result = server.run_until(shutdown_signal()).await;

    tracing::info!("Shutting down gracefully...");
    watcher.stop().await;

    if let Err(e) = result {
        tracing::error!(error = %e, "Server failed to start");
        return Err(e.into());
    }

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
