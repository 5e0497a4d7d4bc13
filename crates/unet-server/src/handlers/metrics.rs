//! Prometheus scrape endpoint.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::server::AppState;

pub async fn get_prometheus_metrics(State(app_state): State<AppState>) -> Response {
    match app_state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to render prometheus metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::app_state::tests::create_mock_app_state;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn scrape_endpoint_returns_prometheus_text() {
        let app_state = create_mock_app_state().await;
        let response = get_prometheus_metrics(State(app_state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!body.is_empty());
    }
}
