//! Byte sources the watcher can monitor
//!
//! A source answers two questions: "what does it look like now" (a cheap
//! probe returning a modification signature) and "what does it contain"
//! (a full read). The watcher only reads when the probe says something moved.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;

/// Modification signature of a source: mtime plus size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSignature {
    /// Last modification time
    pub modified: SystemTime,
    /// Size in bytes
    pub size: u64,
}

/// Something the watcher can probe and read
pub trait FrameSource: Send + Sync + 'static {
    /// Stat the source
    ///
    /// Returns `Ok(None)` when the source does not exist. Any other failure
    /// is an error.
    fn probe(&self) -> impl Future<Output = io::Result<Option<SourceSignature>>> + Send;

    /// Read the full contents
    fn read(&self) -> impl Future<Output = io::Result<Bytes>> + Send;

    /// Human-readable name for logs
    fn describe(&self) -> String;
}

/// A file on the local filesystem
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for FileSource {
    async fn probe(&self) -> io::Result<Option<SourceSignature>> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(Some(SourceSignature {
                modified: meta.modified()?,
                size: meta.len(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn read(&self) -> io::Result<Bytes> {
        tokio::fs::read(&self.path).await.map(Bytes::from)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
