//! HTTP/1.1 response encoding

use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, DATE, ETAG, SERVER};
use http::{HeaderMap, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::Result;

const SERVER_NAME: &str = concat!("frame-monitor/", env!("CARGO_PKG_VERSION"));

/// A complete response: status, headers, and an in-memory body
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Plain text error body, in the style of most HTTP servers
    pub fn text(status: StatusCode, message: &str) -> Self {
        Self::new(status)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(http::header::X_CONTENT_TYPE_OPTIONS, "nosniff")
            .body(Bytes::from(format!("{message}\n")))
    }

    /// Set a header, replacing any previous value
    ///
    /// Values that are not valid header text are dropped with a warning.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => {
                tracing::warn!(header = %name, value = value, "Dropping invalid header value");
            }
        }
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Whether this status may carry a body
    fn allows_body(&self) -> bool {
        !(self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED)
    }

    /// Encode status line and headers
    ///
    /// `Content-Length` is derived from the body unless the caller already set
    /// one (streamed responses set `Transfer-Encoding` instead and leave the
    /// body empty).
    pub fn encode_head(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(256);

        buf.put_slice(b"HTTP/1.1 ");
        buf.put_slice(self.status.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status.canonical_reason().unwrap_or("Unknown").as_bytes());
        buf.put_slice(b"\r\n");

        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        put_header(&mut buf, DATE.as_str(), date.as_bytes());
        put_header(&mut buf, SERVER.as_str(), SERVER_NAME.as_bytes());

        for (name, value) in &self.headers {
            put_header(&mut buf, name.as_str(), value.as_bytes());
        }

        let streamed = self.headers.contains_key(http::header::TRANSFER_ENCODING);
        if self.allows_body() && !streamed && !self.headers.contains_key(CONTENT_LENGTH) {
            put_header(&mut buf, CONTENT_LENGTH.as_str(), self.body.len().to_string().as_bytes());
        }

        buf.put_slice(b"\r\n");
        buf
    }

    /// Write the response, omitting the body for `HEAD` requests
    ///
    /// Returns the number of bytes written.
    pub async fn write_to<W>(&self, writer: &mut W, head_only: bool) -> Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let head = self.encode_head();
        writer.write_all(&head).await?;

        let mut written = head.len();
        if !head_only && self.allows_body() && !self.body.is_empty() {
            writer.write_all(&self.body).await?;
            written += self.body.len();
        }

        writer.flush().await?;
        Ok(written)
    }
}

fn put_header(buf: &mut BytesMut, name: &str, value: &[u8]) {
    // Names are case-insensitive; write them the way they are registered
    if name == ETAG.as_str() {
        buf.put_slice(b"ETag");
    } else {
        let mut upper = true;
        for b in name.bytes() {
            buf.put_u8(if upper { b.to_ascii_uppercase() } else { b });
            upper = b == b'-';
        }
    }
    buf.put_slice(b": ");
    buf.put_slice(value);
    buf.put_slice(b"\r\n");
}
