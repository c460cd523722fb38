//! Error types
//!
//! Every error here is contained to the loop that produced it: the watcher
//! retries on its next tick, a connection closes, the process keeps running.
//! Only [`Error::Startup`] is meant to reach the process boundary.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate error type
#[derive(Error, Debug)]
pub enum Error {
    /// Source exists but could not be read
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[source] io::Error),

    /// Client went away while we were writing to it
    #[error("client disconnected")]
    ClientDisconnected,

    /// Nothing has been published to the store yet
    #[error("no frame available yet")]
    NoDataYet,

    /// Could not bind or listen
    #[error("failed to start server on {addr}: {source}")]
    Startup {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Request line or headers could not be parsed
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Request head exceeded the configured limit
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),

    /// Peer did not complete an operation in time
    #[error("operation timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error only means the peer hung up
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::ClientDisconnected => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
