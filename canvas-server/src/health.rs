//! Health and readiness endpoints.
//!
//! - `/health/live` answers while the process is up
//! - `/health/ready` checks the store's data directory and reports counts
//! - `/api/health` is the `{status, timestamp}` ping the web client polls

use axum::{extract::State, http::StatusCode, Json};
use canvas_core::current_timestamp_ms;
use serde::Serialize;

use crate::AppState;

/// Body of `GET /health/ready`.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// `healthy` or `unhealthy`.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Per-component results.
    pub checks: HealthChecks,
}

/// Component results for readiness.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Store usable; false once a configured data directory is gone
    pub canvas_store: bool,
    /// Number of canvases currently held
    pub canvases: usize,
    /// Number of rooms with at least one member
    pub active_rooms: usize,
}

/// Response of `GET /api/health`.
#[derive(Debug, Serialize)]
pub struct ApiHealth {
    /// Always "ok" while the process serves requests.
    pub status: &'static str,
    /// Server time in milliseconds.
    pub timestamp: u64,
}

/// `GET /health/live`
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// `GET /health/ready`; 503 when the data directory has disappeared.
#[tracing::instrument(name = "readiness", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let store_ok = state.store.data_dir().map_or(true, std::path::Path::is_dir);

    let status = HealthStatus {
        status: if store_ok { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        checks: HealthChecks {
            canvas_store: store_ok,
            canvases: state.store.file_ids().len(),
            active_rooms: state.relay.rooms().room_count(),
        },
    };

    if store_ok {
        (StatusCode::OK, Json(status))
    } else {
        tracing::warn!("Readiness failed: data directory missing");
        (StatusCode::SERVICE_UNAVAILABLE, Json(status))
    }
}

/// `GET /api/health`
pub async fn api_health() -> Json<ApiHealth> {
    Json(ApiHealth {
        status: "ok",
        timestamp: current_timestamp_ms(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_body_shape() {
        let status = HealthStatus {
            status: "healthy",
            version: "0.2.0",
            checks: HealthChecks {
                canvas_store: true,
                canvases: 3,
                active_rooms: 1,
            },
        };

        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["checks"]["canvases"], 3);
        assert_eq!(json["checks"]["active_rooms"], 1);
    }

    #[tokio::test]
    async fn test_api_health_reports_ok() {
        let Json(health) = api_health().await;
        assert_eq!(health.status, "ok");
        assert!(health.timestamp > 0);
    }
}
