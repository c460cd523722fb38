//! Latest-frame cache
//!
//! The store is the only shared mutable state in the process. One writer
//! (the source watcher) and any number of readers (snapshot requests and
//! stream loops) meet here.
//!
//! ```text
//!   SourceWatcher ──publish()──► FrameStore { Option<Arc<Frame>> }
//!                                    │
//!                 ┌──────────────────┼──────────────────┐
//!                 ▼                  ▼                  ▼
//!            GET /image         GET /video         GET /video
//!            snapshot()         snapshot() / tick  snapshot() / tick
//! ```

pub mod frame;
pub mod store;

pub use frame::{Frame, FreshnessToken};
pub use store::FrameStore;
