//! Live multipart stream
//!
//! Each connection runs its own loop: on every tick, sample the store and,
//! if a frame is present, write it as one multipart part. There is no queue
//! and no subscriber list. A client that cannot keep up simply sees fewer
//! frames, because every tick re-samples the latest frame and missed ticks
//! are skipped rather than replayed.
//!
//! Every part looks like this:
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes>\r\n
//! ```
//!
//! HTTP/1.1 clients get each part wrapped in one HTTP chunk, and shutdown
//! ends the body with the zero-length chunk. HTTP/1.0 has no chunked coding,
//! so those clients get bare parts and the body ends when the connection
//! closes.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, TRANSFER_ENCODING, X_CONTENT_TYPE_OPTIONS};
use http::{StatusCode, Version};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::cache::FrameStore;
use crate::error::{Error, Result};
use crate::stats::StreamStats;

use super::response::Response;
use super::snapshot::FRAME_CONTENT_TYPE;

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// Default stream cadence (~30 frames per second)
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Why a stream loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Client closed, reset, or stalled past the write timeout
    ClientGone,
    /// Server is shutting down
    Shutdown,
}

/// How the multipart body is delimited on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// One HTTP chunk per part (HTTP/1.1)
    #[default]
    Chunked,
    /// Bare parts, body ends at connection close (HTTP/1.0)
    CloseDelimited,
}

impl Framing {
    /// Framing a client speaking `version` can decode
    pub fn for_version(version: Version) -> Self {
        match version {
            Version::HTTP_09 | Version::HTTP_10 => Framing::CloseDelimited,
            _ => Framing::Chunked,
        }
    }

    /// Whether the connection must close once the stream ends
    pub fn closes_connection(self) -> bool {
        self == Framing::CloseDelimited
    }

    /// Bytes after the payload: its CRLF, plus the chunk's CRLF when chunked
    fn part_tail(self) -> &'static [u8] {
        match self {
            Framing::Chunked => b"\r\n\r\n",
            Framing::CloseDelimited => b"\r\n",
        }
    }
}

/// Response head for `GET /video`
pub fn stream_head(framing: Framing) -> Response {
    let response = Response::new(StatusCode::OK)
        .header(
            CONTENT_TYPE,
            &format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )
        .header(CACHE_CONTROL, "no-cache")
        .header(X_CONTENT_TYPE_OPTIONS, "nosniff");

    match framing {
        Framing::Chunked => response
            .header(CONNECTION, "keep-alive")
            .header(TRANSFER_ENCODING, "chunked"),
        // No Content-Length either: the close marks the end of the body
        Framing::CloseDelimited => response.header(CONNECTION, "close"),
    }
}

/// Encode the part headers for a payload of `len` bytes, preceded by the
/// chunk-size line when chunked
///
/// The payload itself is written separately so it is never copied.
pub fn encode_part_head(len: usize, framing: Framing) -> BytesMut {
    let part_head = format!(
        "--{BOUNDARY}\r\nContent-Type: {FRAME_CONTENT_TYPE}\r\nContent-Length: {len}\r\n\r\n"
    );

    let mut buf = BytesMut::with_capacity(part_head.len() + 10);
    if framing == Framing::Chunked {
        // Part head + payload + CRLF after the payload
        let chunk_len = part_head.len() + len + 2;
        buf.put_slice(format!("{chunk_len:X}\r\n").as_bytes());
    }
    buf.put_slice(part_head.as_bytes());
    buf
}

/// Zero-length chunk ending a chunked response body
const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

async fn write_part<W>(writer: &mut W, payload: &[u8], framing: Framing) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let head = encode_part_head(payload.len(), framing);
    let tail = framing.part_tail();

    let result = async {
        writer.write_all(&head).await?;
        writer.write_all(payload).await?;
        writer.write_all(tail).await?;
        writer.flush().await
    }
    .await;

    match result {
        Ok(()) => Ok(head.len() + payload.len() + tail.len()),
        Err(_) => Err(Error::ClientDisconnected),
    }
}

/// Per-connection stream loop
#[derive(Debug, Clone)]
pub struct StreamBroadcaster {
    store: Arc<FrameStore>,
    frame_interval: Duration,
    write_timeout: Duration,
    framing: Framing,
}

impl StreamBroadcaster {
    pub fn new(store: Arc<FrameStore>, frame_interval: Duration, write_timeout: Duration) -> Self {
        Self {
            store,
            frame_interval: frame_interval.max(Duration::from_millis(1)),
            write_timeout,
            framing: Framing::Chunked,
        }
    }

    /// Set the body framing; must match the head sent with [`stream_head`]
    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }


    /// Stream frames until the client goes away or shutdown is signalled
    ///
    /// `reader` is the client's half of the connection; it is only watched
    /// for EOF so a disconnect is noticed even between frames. The response
    /// head must already have been written.
    pub async fn run<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        shutdown: &mut watch::Receiver<bool>,
    ) -> (StreamEnd, StreamStats)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut stats = StreamStats::new();

        if *shutdown.borrow() {
            self.finish(writer).await;
            return (StreamEnd::Shutdown, stats);
        }

        let mut ticker = time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut discard = [0u8; 256];

        let end = loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break StreamEnd::Shutdown,
                read = reader.read(&mut discard) => match read {
                    // Anything the client sends after the request is ignored
                    Ok(n) if n > 0 => continue,
                    _ => break StreamEnd::ClientGone,
                },
                _ = ticker.tick() => {
                    // Sample outside any lock; the Arc keeps the frame alive during the write
                    let Some(frame) = self.store.snapshot() else {
                        stats.on_skip();
                        continue;
                    };

                    match time::timeout(self.write_timeout, write_part(writer, &frame.data, self.framing)).await {
                        Ok(Ok(written)) => stats.on_frame(written),
                        Ok(Err(_)) => break StreamEnd::ClientGone,
                        Err(_) => {
                            tracing::debug!(
                                timeout_ms = self.write_timeout.as_millis() as u64,
                                "Stream client stalled"
                            );
                            break StreamEnd::ClientGone;
                        }
                    }
                }
            }
        };

        if end == StreamEnd::Shutdown {
            self.finish(writer).await;
        }

        (end, stats)
    }

    /// Terminate the chunked body, best effort
    ///
    /// A close-delimited body is ended by the connection closing instead.
    async fn finish<W>(&self, writer: &mut W)
    where
        W: AsyncWrite + Unpin,
    {
        if self.framing != Framing::Chunked {
            return;
        }

        let _ = time::timeout(self.write_timeout, async {
            writer.write_all(LAST_CHUNK).await?;
            writer.flush().await
        })
        .await;
    }
}
