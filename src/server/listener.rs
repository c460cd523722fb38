//! HTTP server listener
//!
//! Handles the TCP accept loop and spawns one task per connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use crate::cache::FrameStore;
use crate::error::{Error, Result};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::stats::{ServerStats, ServerStatsSnapshot};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Frame server
pub struct FrameServer {
    config: ServerConfig,
    store: Arc<FrameStore>,
    stats: Arc<ServerStats>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl FrameServer {
    /// Create a new server reading frames from `store`
    pub fn new(config: ServerConfig, store: Arc<FrameStore>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            store,
            stats: Arc::new(ServerStats::new()),
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the frame store
    pub fn store(&self) -> &Arc<FrameStore> {
        &self.store
    }

    /// Current server-wide counters
    pub fn stats(&self) -> ServerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|source| Error::Startup {
                addr: self.config.bind_addr,
                source,
            })
    }

    /// Run the server
    ///
    /// This method blocks until the process exits or binding fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    ///
    /// On shutdown every live connection is signalled; stream loops end at
    /// their next tick.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "HTTP server listening");

        let (shutdown_tx, _) = watch::channel(false);
        let stats_handle = self.spawn_stats_task();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener, &shutdown_tx) => result,
        };

        let _ = shutdown_tx.send(true);
        stats_handle.abort();

        result
    }

    async fn accept_loop(&self, listener: &TcpListener, shutdown_tx: &watch::Sender<bool>) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr, shutdown_tx.subscribe());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr, shutdown: watch::Receiver<bool>) {
        // Check connection limit; the permit lives as long as the connection task
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            connection_id = connection_id,
            peer = %peer_addr,
            "New connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let config = self.config.clone();
        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            let _permit = permit;
            stats.connection_opened();

            let (reader, writer) = socket.into_split();
            let mut connection = Connection::new(
                connection_id,
                peer_addr,
                reader,
                writer,
                config,
                store,
                Arc::clone(&stats),
                shutdown,
            );

            if let Err(e) = connection.run().await {
                if e.is_disconnect() {
                    tracing::trace!(connection_id = connection_id, "Client disconnected");
                } else {
                    tracing::debug!(
                        connection_id = connection_id,
                        error = %e,
                        "Connection error"
                    );
                }
            }

            stats.connection_closed();
            tracing::debug!(connection_id = connection_id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }

        Ok(())
    }

    fn spawn_stats_task(&self) -> JoinHandle<()> {
        let stats = Arc::clone(&self.stats);
        let store = Arc::clone(&self.store);
        let interval = self.config.stats_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let snap = stats.snapshot();
                tracing::debug!(
                    connections = snap.active_connections,
                    total_connections = snap.total_connections,
                    streams = snap.active_streams,
                    requests = snap.requests,
                    frames_sent = snap.frames_sent,
                    bytes_sent = snap.bytes_sent,
                    frame_generation = store.generation(),
                    uptime_secs = snap.uptime.as_secs(),
                    "Server stats"
                );
            }
        })
    }
}
