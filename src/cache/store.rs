//! Single-slot frame store
//!
//! Holds at most one [`Frame`]. Publishing builds a fresh `Arc<Frame>` outside
//! the lock and swaps the pointer in; readers clone the `Arc` and drop the
//! lock immediately. The critical section on either side is a pointer copy,
//! so a large payload never stalls readers and no reader ever holds the lock
//! across I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::frame::{Frame, FreshnessToken};

/// Latest-frame cache shared by the watcher and all HTTP consumers
#[derive(Debug, Default)]
pub struct FrameStore {
    current: RwLock<Option<Arc<Frame>>>,
    generation: AtomicU64,
}

impl FrameStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame
    pub fn publish(&self, data: Bytes, modified_at: DateTime<Utc>, size: u64) {
        let frame = Arc::new(Frame::new(data, modified_at, size));

        // Swap under the lock, drop the previous frame after releasing it
        let previous = {
            let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
            slot.replace(frame)
        };
        drop(previous);

        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Shared view of the current frame, or `None` if nothing was published
    pub fn snapshot(&self) -> Option<Arc<Frame>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a frame has ever been published
    ///
    /// Once true, stays true: the store never reverts to absent.
    pub fn has_data(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Freshness token of the current frame without touching the payload
    pub fn current_token(&self) -> Option<FreshnessToken> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|frame| frame.token)
    }

    /// Number of publishes since creation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
