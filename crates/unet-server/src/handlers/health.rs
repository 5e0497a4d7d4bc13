//! Health check handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use sea_orm::ConnectionTrait;
use serde_json::json;
use tracing::{debug, warn};

use crate::handlers::ServerResult;
use crate::server::AppState;

/// Health check endpoint: database liveness plus time-series buffer
/// backpressure (§4.5 — a degraded time-series backend must not fail the
/// current-state path, but should show up here).
pub async fn health_check(
    State(app_state): State<AppState>,
) -> ServerResult<(StatusCode, Json<serde_json::Value>)> {
    debug!("health check requested");

    let db_healthy = match app_state.db.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "database health check failed");
            false
        }
    };

    let buffer_depth = app_state.timeseries.depth();
    let degraded = !db_healthy;

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if degraded { "degraded" } else { "healthy" },
        "service": "unet-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "components": {
            "database": { "status": if db_healthy { "healthy" } else { "unhealthy" } },
            "timeseries_buffer": { "depth": buffer_depth }
        }
    });

    Ok((status_code, Json(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::app_state::tests::create_mock_app_state;

    #[tokio::test]
    async fn healthy_database_reports_200_and_healthy_status() {
        let app_state = create_mock_app_state().await;
        let (status, Json(body)) = health_check(State(app_state)).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["components"]["database"]["status"], "healthy");
    }
}
