//! Frame and freshness token types
//!
//! A [`Frame`] is an immutable snapshot of the monitored source. It is never
//! mutated after construction; the store replaces it wholesale.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Validator derived from the source's modification time and size
///
/// Doubles as the change-detection key and the HTTP entity tag. Two frames
/// written within the same second with the same size collide; that case is
/// accepted rather than guarded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FreshnessToken {
    /// Modification time in whole seconds since the Unix epoch
    pub modified_secs: i64,
    /// Payload size in bytes
    pub size: u64,
}

impl FreshnessToken {
    /// Derive a token from modification time and size
    pub fn new(modified_at: DateTime<Utc>, size: u64) -> Self {
        Self {
            modified_secs: modified_at.timestamp(),
            size,
        }
    }

    /// Check an `If-None-Match` header value against this token
    ///
    /// Accepts a comma separated list of entity tags and `*`. Comparison is
    /// weak: a `W/` prefix on the client's tag is ignored.
    pub fn matches_header(&self, value: &str) -> bool {
        let ours = self.to_string();

        value.split(',').map(str::trim).any(|tag| {
            if tag == "*" {
                return true;
            }
            let tag = tag.strip_prefix("W/").unwrap_or(tag);
            tag == ours
        })
    }
}

impl std::fmt::Display for FreshnessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}-{}\"", self.modified_secs, self.size)
    }
}

/// One immutable snapshot of the source
///
/// Cheap to share: the payload is a reference-counted `Bytes`, and the store
/// hands out `Arc<Frame>`, so readers never copy the image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Opaque payload
    pub data: Bytes,
    /// Source modification time at capture
    pub modified_at: DateTime<Utc>,
    /// Size reported by the source at capture
    pub size: u64,
    /// Validator computed from `modified_at` and `size`
    pub token: FreshnessToken,
}

impl Frame {
    /// Build a frame, computing its freshness token
    pub fn new(data: Bytes, modified_at: DateTime<Utc>, size: u64) -> Self {
        Self {
            data,
            modified_at,
            size,
            token: FreshnessToken::new(modified_at, size),
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    ///
    /// An empty frame is still a frame: the store is not absent.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `Last-Modified` value in IMF-fixdate form
    pub fn http_date(&self) -> String {
        self.modified_at
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string()
    }
}
