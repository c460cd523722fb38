//! Routing table

use http::header::ALLOW;
use http::{Method, StatusCode};

use crate::cache::FrameStore;
use crate::web::{assets, health, snapshot, RequestHead, Response};

/// Known endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    Image,
    Video,
    Health,
    Logo,
    NotFound,
}

impl Route {
    pub fn resolve(path: &str) -> Self {
        match path {
            "/" => Route::Index,
            "/image" => Route::Image,
            "/video" => Route::Video,
            "/health" => Route::Health,
            "/logo.svg" => Route::Logo,
            _ => Route::NotFound,
        }
    }

    /// Whether this route holds the connection open for a live stream
    pub fn is_stream(self) -> bool {
        self == Route::Video
    }
}

/// Whether the method is served at all
pub fn method_allowed(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// Build the response for every route except the live stream
pub fn dispatch(route: Route, request: &RequestHead, store: &FrameStore) -> Response {
    if !method_allowed(&request.method) {
        return Response::text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
            .header(ALLOW, "GET, HEAD");
    }

    match route {
        Route::Index => assets::handle_index(),
        Route::Image => snapshot::handle_image(store, request),
        Route::Health => health::handle_health(store),
        Route::Logo => assets::handle_logo(),
        Route::Video | Route::NotFound => Response::text(StatusCode::NOT_FOUND, "404 page not found"),
    }
}
