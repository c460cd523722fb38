//! Single-shot frame fetch with conditional-GET support

use std::sync::Arc;

use http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH, LAST_MODIFIED};
use http::StatusCode;

use crate::cache::{Frame, FrameStore};
use crate::error::{Error, Result};

use super::request::RequestHead;
use super::response::Response;

/// Content type advertised for frames
pub const FRAME_CONTENT_TYPE: &str = "image/jpeg";

/// Outcome of a conditional fetch
#[derive(Debug, Clone)]
pub enum Fetch {
    /// Client's validator matches the current frame
    NotModified(Arc<Frame>),
    /// Client needs the current frame
    Modified(Arc<Frame>),
}

impl Fetch {
    pub fn frame(&self) -> &Arc<Frame> {
        match self {
            Fetch::NotModified(frame) | Fetch::Modified(frame) => frame,
        }
    }
}

/// Sample the store once and decide whether the client is up to date
///
/// Token comparison and payload come from the same sampled frame, so a
/// concurrent publish can never pair a fresh token with a stale body.
pub fn fetch(store: &FrameStore, if_none_match: Option<&str>) -> Result<Fetch> {
    let frame = store.snapshot().ok_or(Error::NoDataYet)?;

    match if_none_match {
        Some(value) if frame.token.matches_header(value) => Ok(Fetch::NotModified(frame)),
        _ => Ok(Fetch::Modified(frame)),
    }
}

/// `GET /image`
pub fn handle_image(store: &FrameStore, request: &RequestHead) -> Response {
    let fetched = match fetch(store, request.header(&IF_NONE_MATCH)) {
        Ok(fetched) => fetched,
        Err(_) => return Response::text(StatusCode::NOT_FOUND, "Image not available"),
    };

    let frame = fetched.frame();
    let base = |status| {
        Response::new(status)
            .header(CONTENT_TYPE, FRAME_CONTENT_TYPE)
            .header(ETAG, &frame.token.to_string())
            .header(LAST_MODIFIED, &frame.http_date())
            .header(CACHE_CONTROL, "no-cache")
    };

    match fetched {
        Fetch::NotModified(_) => base(StatusCode::NOT_MODIFIED),
        Fetch::Modified(_) => base(StatusCode::OK).body(frame.data.clone()),
    }
}
