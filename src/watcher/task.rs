//! Background polling task
//!
//! `start()` probes once inline, so a consumer arriving right after start
//! already sees data, then spawns the periodic loop. `stop()` signals the
//! loop and waits for it to exit; once it returns no further publish can
//! happen. The poller is handed back by the task, so a stopped watcher can
//! be started again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::cache::FrameStore;

use super::config::WatcherConfig;
use super::poller::Poller;
use super::source::{FileSource, FrameSource};

struct RunningTask<S: FrameSource> {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<Poller<S>>,
}

/// Keeps the frame store in sync with a source
pub struct SourceWatcher<S: FrameSource> {
    poll_interval: Duration,
    poller: Option<Poller<S>>,
    task: Option<RunningTask<S>>,
}

impl SourceWatcher<FileSource> {
    /// Watch the file named in `config`
    pub fn from_config(config: &WatcherConfig, store: Arc<FrameStore>) -> Self {
        Self::new(
            FileSource::new(config.path.clone()),
            store,
            config.poll_interval,
        )
    }
}

impl<S: FrameSource> SourceWatcher<S> {
    pub fn new(source: S, store: Arc<FrameStore>, poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            poller: Some(Poller::new(source, store)),
            task: None,
        }
    }

    /// Whether the polling loop is running
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Probe once, then start polling in the background
    ///
    /// Calling this while already running is a no-op.
    pub async fn start(&mut self) {
        if self.task.is_some() {
            tracing::warn!("Source watcher already running");
            return;
        }

        let Some(mut poller) = self.poller.take() else {
            tracing::error!("Source watcher lost its poller and cannot restart");
            return;
        };

        poller.tick().await;

        tracing::info!(
            source = %poller.source().describe(),
            interval_ms = self.poll_interval.as_millis() as u64,
            has_frame = poller.last_signature().is_some(),
            "Source watcher started"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(poller, self.poll_interval, stop_rx));

        self.task = Some(RunningTask { stop_tx, handle });
    }

    /// Stop polling and wait for the loop to exit
    ///
    /// Safe to call when not running.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        let _ = task.stop_tx.send(true);

        match task.handle.await {
            Ok(poller) => {
                tracing::info!(source = %poller.source().describe(), "Source watcher stopped");
                self.poller = Some(poller);
            }
            Err(e) => {
                tracing::error!(error = %e, "Source watcher task failed");
            }
        }
    }
}

async fn run_loop<S: FrameSource>(
    mut poller: Poller<S>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) -> Poller<S> {
    // First probe already happened in start()
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            // Err means the watcher was dropped without stop()
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                poller.tick().await;
            }
        }
    }

    poller
}
