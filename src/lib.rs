//! Serve a continuously overwritten image file over HTTP
//!
//! An external producer keeps rewriting one image file. This crate watches
//! that file, keeps the latest frame in memory, and serves it two ways:
//!
//! - `GET /image`: the latest frame, with `ETag` / `If-None-Match` support
//! - `GET /video`: a `multipart/x-mixed-replace` stream at a fixed cadence
//!
//! The filesystem is never touched on the request path. Data flows one way:
//!
//! ```text
//!   file ──► SourceWatcher ──publish──► FrameStore ──snapshot──► HTTP clients
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use frame_monitor::{FrameServer, FrameStore, ServerConfig, SourceWatcher, WatcherConfig};
//!
//! # async fn example() -> frame_monitor::Result<()> {
//! let store = Arc::new(FrameStore::new());
//!
//! let mut watcher = SourceWatcher::from_config(&WatcherConfig::new("/tmp/output.jpg"), Arc::clone(&store));
//! watcher.start().await;
//!
//! let server = FrameServer::new(ServerConfig::default(), store);
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//!
//! watcher.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod server;
pub mod stats;
pub mod watcher;
pub mod web;

pub use cache::{Frame, FrameStore, FreshnessToken};
pub use error::{Error, Result};
pub use server::{FrameServer, ServerConfig};
pub use watcher::{FileSource, FrameSource, SourceWatcher, WatcherConfig};
