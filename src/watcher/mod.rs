//! Source watcher
//!
//! Polls a byte source at a fixed interval and publishes new content into the
//! [`FrameStore`](crate::cache::FrameStore). Runs independently of consumers;
//! a missing or unreadable source never clears the store.

pub mod config;
pub mod poller;
pub mod source;
pub mod task;

pub use config::WatcherConfig;
pub use poller::{PollOutcome, Poller};
pub use source::{FileSource, FrameSource, SourceSignature};
pub use task::SourceWatcher;
