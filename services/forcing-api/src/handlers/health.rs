//! Health and metrics handlers.

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use grid_processor::PipelineCacheStats;
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub product: String,
    pub caches: PipelineCacheStats,
}

/// GET /health - Basic health check
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /ready - Readiness check with cache statistics
pub async fn ready_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let config = state.pipeline.config();
    let response = ReadyResponse {
        ready: true,
        product: format!("{}/{}/{}", config.run, config.variable, config.geography),
        caches: state.pipeline.cache_stats(),
    };
    json_response(StatusCode::OK, &response)
}

/// GET /metrics - Prometheus metrics
pub async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let body = state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "ok");
    }
}
