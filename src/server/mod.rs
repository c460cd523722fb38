//! HTTP server
//!
//! Accepts TCP connections and serves the routing table on each:
//!
//! ```text
//!   TcpListener ──accept──► Connection (task per client)
//!                              │
//!                  ┌───────────┼─────────────┐
//!                  ▼           ▼             ▼
//!              /image       /health        /video
//!           one response  one response  StreamBroadcaster loop
//! ```

pub mod config;
pub mod connection;
pub mod listener;
pub mod router;

pub use config::ServerConfig;
pub use connection::Connection;
pub use listener::FrameServer;
pub use router::Route;
