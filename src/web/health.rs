//! Health probe

use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde::Serialize;

use crate::cache::FrameStore;

use super::response::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    NoImage,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// RFC 3339, UTC, whole seconds
    pub timestamp: String,
}

impl HealthReport {
    pub fn from_store(store: &FrameStore) -> Self {
        let status = if store.has_data() {
            HealthStatus::Ok
        } else {
            HealthStatus::NoImage
        };

        Self {
            status,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// `GET /health`
pub fn handle_health(store: &FrameStore) -> Response {
    let report = HealthReport::from_store(store);

    match serde_json::to_vec(&report) {
        Ok(body) => Response::new(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(body)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode health report");
            Response::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    #[test]
    fn test_health_without_image() {
        let store = FrameStore::new();
        let response = handle_health(&store);

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[CONTENT_TYPE], "application/json");

        let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(json["status"], "no_image");

        let timestamp = json["timestamp"].as_str().unwrap();
        assert!(timestamp.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_health_with_image() {
        let store = FrameStore::new();
        store.publish(Bytes::from_static(b"test image"), Utc::now(), 10);

        let report = HealthReport::from_store(&store);
        assert_eq!(report.status, HealthStatus::Ok);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
    }
}
