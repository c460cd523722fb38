//! Per-connection request loop
//!
//! Serves requests on one TCP connection until the client closes it, asks
//! for close, idles out, or upgrades it into a live stream. A stream owns the
//! connection until it ends.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use http::header::CONNECTION;
use http::{Method, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time;

use crate::cache::FrameStore;
use crate::error::{Error, Result};
use crate::web::stream::{stream_head, Framing, StreamBroadcaster};
use crate::web::{read_head, RequestHead, Response};
use crate::server::config::ServerConfig;
use crate::server::router::{self, Route};
use crate::stats::ServerStats;

/// One client connection
///
/// Generic over the two halves so tests can drive it with in-memory pipes.
pub struct Connection<R, W> {
    id: u64,
    peer_addr: SocketAddr,
    reader: R,
    writer: W,
    buf: BytesMut,
    config: ServerConfig,
    store: Arc<FrameStore>,
    stats: Arc<ServerStats>,
    shutdown: watch::Receiver<bool>,
}

/// What to do after a request has been answered
enum Next {
    KeepAlive,
    Close,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        peer_addr: SocketAddr,
        reader: R,
        writer: W,
        config: ServerConfig,
        store: Arc<FrameStore>,
        stats: Arc<ServerStats>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            reader,
            writer,
            buf: BytesMut::with_capacity(1024),
            config,
            store,
            stats,
            shutdown,
        }
    }

    /// Serve requests until the connection ends
    pub async fn run(&mut self) -> Result<()> {
        let mut first = true;

        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }

            let wait = if first {
                self.config.read_timeout
            } else {
                self.config.idle_timeout
            };
            first = false;

            let read = tokio::select! {
                biased;
                _ = self.shutdown.changed() => return Ok(()),
                read = time::timeout(
                    wait,
                    read_head(&mut self.reader, &mut self.buf, self.config.max_head_size),
                ) => read,
            };

            let request = match read {
                Err(_) => {
                    tracing::trace!(connection_id = self.id, "Connection timed out waiting for request");
                    return Ok(());
                }
                Ok(Ok(None)) => return Ok(()),
                Ok(Ok(Some(request))) => request,
                Ok(Err(e)) => {
                    self.reject(&e).await;
                    return Err(e);
                }
            };

            match self.handle(request).await? {
                Next::KeepAlive => continue,
                Next::Close => return Ok(()),
            }
        }
    }

    async fn handle(&mut self, request: RequestHead) -> Result<Next> {
        let started = Instant::now();
        let route = Route::resolve(&request.path);
        let head_only = request.method == Method::HEAD;

        if route.is_stream() && router::method_allowed(&request.method) {
            return self.serve_stream(&request, head_only, started).await;
        }

        let keep_alive = request.keep_alive() && !*self.shutdown.borrow();
        let mut response = router::dispatch(route, &request, &self.store);
        if !keep_alive {
            response = response.header(CONNECTION, "close");
        }

        let written = self.send(&response, head_only).await?;
        self.stats.request_served(written);
        log_request(self.id, &request, response.status, started);

        Ok(if keep_alive { Next::KeepAlive } else { Next::Close })
    }

    async fn serve_stream(
        &mut self,
        request: &RequestHead,
        head_only: bool,
        started: Instant,
    ) -> Result<Next> {
        let framing = Framing::for_version(request.version);
        let response = stream_head(framing);
        self.send(&response, true).await?;

        if head_only {
            log_request(self.id, request, response.status, started);
            return Ok(if request.keep_alive() && !framing.closes_connection() {
                Next::KeepAlive
            } else {
                Next::Close
            });
        }

        tracing::debug!(
            connection_id = self.id,
            peer = %self.peer_addr,
            format = request.query_param("format").unwrap_or("multipart"),
            "Stream started"
        );

        let broadcaster = StreamBroadcaster::new(
            Arc::clone(&self.store),
            self.config.frame_interval,
            self.config.write_timeout,
        )
        .framing(framing);

        self.stats.stream_opened();
        let (end, stream_stats) = broadcaster
            .run(&mut self.reader, &mut self.writer, &mut self.shutdown)
            .await;
        self.stats.stream_closed(&stream_stats);

        tracing::debug!(
            connection_id = self.id,
            peer = %self.peer_addr,
            reason = ?end,
            frames = stream_stats.frames_sent,
            skipped = stream_stats.ticks_skipped,
            bytes = stream_stats.bytes_sent,
            duration_ms = stream_stats.duration().as_millis() as u64,
            fps = stream_stats.framerate(),
            "Stream ended"
        );
        log_request(self.id, request, response.status, started);

        // The stream owned the body; nothing can follow it on this connection
        Ok(Next::Close)
    }

    async fn send(&mut self, response: &Response, head_only: bool) -> Result<usize> {
        match time::timeout(
            self.config.write_timeout,
            response.write_to(&mut self.writer, head_only),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Best-effort error response for a request that could not be parsed
    async fn reject(&mut self, error: &Error) {
        let status = match error {
            Error::HeadTooLarge(_) => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => return,
        };

        tracing::debug!(
            connection_id = self.id,
            peer = %self.peer_addr,
            error = %error,
            "Rejecting request"
        );

        let response = Response::text(status, status.canonical_reason().unwrap_or("Bad Request"))
            .header(CONNECTION, "close");
        let _ = self.send(&response, false).await;
    }
}

fn log_request(connection_id: u64, request: &RequestHead, status: StatusCode, started: Instant) {
    tracing::debug!(
        connection_id = connection_id,
        method = %request.method,
        path = %request.path,
        status = status.as_u16(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "Request served"
    );
}
