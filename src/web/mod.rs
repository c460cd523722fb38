//! HTTP endpoints
//!
//! A deliberately small HTTP/1.1 implementation: request heads are parsed by
//! hand, responses are written straight to the socket. Everything here reads
//! from the [`FrameStore`](crate::cache::FrameStore) and nothing writes to it.

pub mod assets;
pub mod health;
pub mod request;
pub mod response;
pub mod snapshot;
pub mod stream;

pub use health::{HealthReport, HealthStatus};
pub use request::{parse_head, read_head, RequestHead};
pub use response::Response;
pub use snapshot::{fetch, Fetch, FRAME_CONTENT_TYPE};
pub use stream::{Framing, StreamBroadcaster, StreamEnd, BOUNDARY, DEFAULT_FRAME_INTERVAL};
