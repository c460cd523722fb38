//! Statistics for connections and streams

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-stream statistics, owned by a single stream loop
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// When the stream started
    pub started_at: Instant,
    /// Frames written to the client
    pub frames_sent: u64,
    /// Ticks where the store was empty
    pub ticks_skipped: u64,
    /// Payload and framing bytes written
    pub bytes_sent: u64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_sent: 0,
            ticks_skipped: 0,
            bytes_sent: 0,
        }
    }

    /// Record one delivered frame
    pub fn on_frame(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Record a tick with nothing to send
    pub fn on_skip(&mut self) {
        self.ticks_skipped += 1;
    }

    /// Time since the stream started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Effective delivery rate in frames per second
    pub fn framerate(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            self.frames_sent as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide counters, shared by every connection
#[derive(Debug)]
pub struct ServerStats {
    started_at: Instant,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    active_streams: AtomicU64,
    requests: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStatsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub active_streams: u64,
    pub requests: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            active_streams: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn stream_opened(&self) {
        self.active_streams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_closed(&self, stream: &StreamStats) {
        self.active_streams.fetch_sub(1, Ordering::Relaxed);
        self.frames_sent.fetch_add(stream.frames_sent, Ordering::Relaxed);
        self.bytes_sent.fetch_add(stream.bytes_sent, Ordering::Relaxed);
    }

    pub fn request_served(&self, bytes: usize) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            active_streams: self.active_streams.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}
