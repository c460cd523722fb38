//! HTTP/1.1 request head parsing
//!
//! Only what the server needs: request line, headers, keep-alive intent.
//! Request bodies are not supported.

use bytes::BytesMut;
use http::header::{HeaderName, HeaderValue, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, Method, Version};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parsed request line and headers
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    /// Header value as a string, if present and visible ASCII
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a query parameter
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k == key).then_some(v)
        })
    }

    /// Whether the client wants the connection kept open after this request
    pub fn keep_alive(&self) -> bool {
        let connection = self.header(&CONNECTION).map(|v| v.to_ascii_lowercase());
        let has = |token: &str| {
            connection
                .as_deref()
                .map(|v| v.split(',').any(|t| t.trim() == token))
                .unwrap_or(false)
        };

        match self.version {
            Version::HTTP_10 => has("keep-alive"),
            _ => !has("close"),
        }
    }
}

/// Parse a complete request head (including the blank line)
pub fn parse_head(raw: &[u8]) -> Result<RequestHead> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| Error::BadRequest("request head is not valid UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let request_line = lines
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| Error::BadRequest("missing request line".into()))?;

    let mut parts = request_line.split(' ');
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => {
            return Err(Error::BadRequest(format!(
                "malformed request line: {request_line:?}"
            )))
        }
    };

    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| Error::BadRequest(format!("invalid method: {method:?}")))?;

    let version = match version {
        "HTTP/1.1" => Version::HTTP_11,
        "HTTP/1.0" => Version::HTTP_10,
        other => return Err(Error::BadRequest(format!("unsupported version: {other:?}"))),
    };

    if !target.starts_with('/') {
        return Err(Error::BadRequest(format!("unsupported request target: {target:?}")));
    }
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    };

    let mut headers = HeaderMap::new();
    for line in lines.take_while(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::BadRequest(format!("malformed header: {line:?}")))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| Error::BadRequest(format!("invalid header name: {name:?}")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| Error::BadRequest(format!("invalid value for header {name}")))?;
        headers.append(name, value);
    }

    let has_body = headers.contains_key(TRANSFER_ENCODING)
        || headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() != "0")
            .unwrap_or(false);
    if has_body {
        return Err(Error::BadRequest("request bodies are not supported".into()));
    }

    Ok(RequestHead {
        method,
        path,
        query,
        version,
        headers,
    })
}

/// Read the next request head from `reader`
///
/// Bytes after the head stay in `buf` for the next call. Returns `Ok(None)`
/// when the peer closes cleanly between requests.
pub async fn read_head<R>(reader: &mut R, buf: &mut BytesMut, max_size: usize) -> Result<Option<RequestHead>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = find_terminator(buf) {
            let head_len = pos + HEAD_TERMINATOR.len();
            if head_len > max_size {
                return Err(Error::HeadTooLarge(max_size));
            }
            let raw = buf.split_to(head_len);
            return parse_head(&raw).map(Some);
        }

        if buf.len() >= max_size {
            return Err(Error::HeadTooLarge(max_size));
        }

        buf.reserve(1024);
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::ClientDisconnected);
        }
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
}
