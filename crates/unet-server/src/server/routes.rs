//! Router configuration and route definitions

use axum::{
    routing::{get, post},
    Router,
};

use super::app_state::AppState;
use crate::handlers;

/// Create the router with all API endpoints (§4.7 read API contract).
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::get_prometheus_metrics))
        .merge(create_device_routes())
        .merge(create_interface_routes())
        .merge(create_problem_routes())
        .merge(create_ws_routes())
}

fn create_device_routes() -> Router<AppState> {
    Router::new()
        .route("/devices", get(handlers::devices::list_devices))
        .route("/devices/{id}", get(handlers::devices::device_detail))
        .route("/devices/{id}/history", get(handlers::devices::device_history))
}

fn create_interface_routes() -> Router<AppState> {
    Router::new()
        .route("/interfaces/isp-status/bulk", get(handlers::interfaces::bulk_isp_status))
        .route(
            "/interfaces/discover/{device_id}",
            post(handlers::interfaces::discover_interfaces),
        )
}

fn create_problem_routes() -> Router<AppState> {
    Router::new().route("/problems", get(handlers::problems::list_problems))
}

fn create_ws_routes() -> Router<AppState> {
    Router::new().route("/ws/updates", get(handlers::changes::ws_updates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::app_state::tests::create_mock_app_state;

    #[tokio::test]
    async fn test_create_router() {
        let router = create_router();
        let app_state = create_mock_app_state().await;
        let _router_with_state: axum::Router = router.with_state(app_state);
    }

    #[tokio::test]
    async fn test_create_device_routes() {
        let router = create_device_routes();
        let app_state = create_mock_app_state().await;
        let _router_with_state: axum::Router = router.with_state(app_state);
    }

    #[tokio::test]
    async fn test_create_interface_routes() {
        let router = create_interface_routes();
        let app_state = create_mock_app_state().await;
        let _router_with_state: axum::Router = router.with_state(app_state);
    }
}
