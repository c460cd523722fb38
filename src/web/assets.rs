//! Embedded viewer page and logo

use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::StatusCode;

use super::response::Response;

const INDEX_HTML: &str = include_str!("../../static/index.html");
const LOGO_SVG: &[u8] = include_bytes!("../../static/logo.svg");

/// `GET /`
pub fn handle_index() -> Response {
    Response::new(StatusCode::OK)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Bytes::from_static(INDEX_HTML.as_bytes()))
}

/// `GET /logo.svg`
pub fn handle_logo() -> Response {
    Response::new(StatusCode::OK)
        .header(CONTENT_TYPE, "image/svg+xml")
        .header(CACHE_CONTROL, "public, max-age=3600")
        .body(Bytes::from_static(LOGO_SVG))
}
