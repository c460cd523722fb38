//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::web::DEFAULT_FRAME_INTERVAL;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Time between frames on a live stream
    pub frame_interval: Duration,

    /// A request head must arrive within this time
    pub read_timeout: Duration,

    /// Budget for writing a whole response, or one frame on a stream
    pub write_timeout: Duration,

    /// Keep-alive connections idle longer than this are closed
    pub idle_timeout: Duration,

    /// Maximum request head size in bytes
    pub max_head_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Stats logging interval
    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            frame_interval: DEFAULT_FRAME_INTERVAL,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
            max_head_size: 8 * 1024,
            tcp_nodelay: true, // Frames should leave as soon as they are flushed
            stats_interval: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the stream frame interval
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set write timeout
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set stats logging interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval.max(Duration::from_millis(1));
        self
    }
}
