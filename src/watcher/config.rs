//! Watcher configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default file monitored when none is given
pub const DEFAULT_SOURCE_PATH: &str = "/tmp/output.jpg";

/// Default polling interval (~30 probes per second)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(33);

/// Source watcher configuration
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// File to monitor
    pub path: PathBuf,

    /// Time between probes
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SOURCE_PATH),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WatcherConfig {
    /// Create a config for the given path with the default interval
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the polling interval
    ///
    /// Zero is bumped to one millisecond; `tokio::time::interval` rejects it.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }
}
