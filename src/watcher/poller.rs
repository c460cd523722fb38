//! Change detection for a single source
//!
//! One probe per tick:
//!
//! ```text
//!   probe ─┬─ not found ──────────────────────────► SourceMissing
//!          ├─ signature == last ──────────────────► Unchanged
//!          └─ signature != last ── read ─┬─ ok ───► Published (record signature)
//!                                        ├─ len != size ► ChangedDuringRead (NOT recorded)
//!                                        └─ err ──► error (signature NOT recorded)
//! ```
//!
//! A failed read leaves the recorded signature alone so the next tick retries
//! the same change.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::FrameStore;
use crate::error::{Error, Result};

use super::source::{FrameSource, SourceSignature};

/// Result of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Signature matches the last published one
    Unchanged,
    /// Source does not exist; the store keeps its last frame
    SourceMissing,
    /// New content was read and published
    Published,
    /// Source was rewritten between probe and read; retried next tick
    ChangedDuringRead,
}

/// Probes a source and publishes changes into the store
pub struct Poller<S: FrameSource> {
    source: S,
    store: Arc<FrameStore>,
    last_signature: Option<SourceSignature>,
    missing: bool,
    consecutive_failures: u32,
}

impl<S: FrameSource> Poller<S> {
    pub fn new(source: S, store: Arc<FrameStore>) -> Self {
        Self {
            source,
            store,
            last_signature: None,
            missing: false,
            consecutive_failures: 0,
        }
    }

    /// The monitored source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Signature of the last successfully published content
    pub fn last_signature(&self) -> Option<SourceSignature> {
        self.last_signature
    }

    /// Probe once and publish if the source changed
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let signature = match self.source.probe().await.map_err(Error::SourceUnavailable)? {
            Some(signature) => signature,
            None => return Ok(PollOutcome::SourceMissing),
        };

        if self.last_signature == Some(signature) {
            return Ok(PollOutcome::Unchanged);
        }

        let data = self.source.read().await.map_err(Error::SourceUnavailable)?;

        // Size and token must describe these bytes; leave the signature
        // unrecorded so the next probe picks up the rewrite
        if data.len() as u64 != signature.size {
            return Ok(PollOutcome::ChangedDuringRead);
        }

        self.store.publish(
            data,
            DateTime::<Utc>::from(signature.modified),
            signature.size,
        );
        self.last_signature = Some(signature);

        Ok(PollOutcome::Published)
    }

    /// Probe once, logging the outcome instead of returning errors
    ///
    /// Missing sources and read failures are logged on transition only so a
    /// 30Hz loop does not flood the log.
    pub async fn tick(&mut self) -> Option<PollOutcome> {
        match self.poll_once().await {
            Ok(outcome) => {
                if self.consecutive_failures > 0 {
                    tracing::info!(
                        source = %self.source.describe(),
                        failures = self.consecutive_failures,
                        "Source readable again"
                    );
                    self.consecutive_failures = 0;
                }

                match outcome {
                    PollOutcome::SourceMissing if !self.missing => {
                        self.missing = true;
                        tracing::info!(
                            source = %self.source.describe(),
                            has_frame = self.store.has_data(),
                            "Source missing, keeping last frame"
                        );
                    }
                    PollOutcome::Published | PollOutcome::Unchanged if self.missing => {
                        self.missing = false;
                        tracing::info!(source = %self.source.describe(), "Source reappeared");
                    }
                    _ => {}
                }

                if outcome == PollOutcome::ChangedDuringRead {
                    tracing::trace!(source = %self.source.describe(), "Source rewritten mid-read, retrying");
                }

                if outcome == PollOutcome::Published {
                    tracing::trace!(
                        source = %self.source.describe(),
                        generation = self.store.generation(),
                        size = self.last_signature.map(|s| s.size).unwrap_or(0),
                        "Frame published"
                    );
                }

                Some(outcome)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures == 1 {
                    tracing::warn!(
                        source = %self.source.describe(),
                        error = %e,
                        "Failed to read source, retrying next tick"
                    );
                } else {
                    tracing::debug!(
                        source = %self.source.describe(),
                        error = %e,
                        failures = self.consecutive_failures,
                        "Source still unreadable"
                    );
                }
                None
            }
        }
    }
}
