//! Forcing gridline handler.

use axum::{extract::Extension, http::StatusCode, response::Response};
use grid_processor::Gridlines;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use super::{forecast_error_response, json_response};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct GridlinesResponse<'a> {
    pub horiz_gridlines: &'a [Vec<[f64; 2]>],
    pub vert_gridlines: &'a [Vec<[f64; 2]>],
}

impl<'a> From<&'a Gridlines> for GridlinesResponse<'a> {
    fn from(lines: &'a Gridlines) -> Self {
        Self {
            horiz_gridlines: &lines.horizontal,
            vert_gridlines: &lines.vertical,
        }
    }
}

/// GET /get_forecasted_forcing_grid - Grid lines at the session scale
pub async fn forcing_grid_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    metrics::counter!("forcing_api_requests_total", "endpoint" => "forcing_grid").increment(1);
    let started = Instant::now();
    let scale = state.session.read().await.scale;

    match state.pipeline.gridlines(scale).await {
        Ok(lines) => {
            tracing::info!(
                scale = %scale,
                horizontal = lines.horizontal.len(),
                vertical = lines.vertical.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Forcing gridlines served"
            );
            json_response(StatusCode::OK, &GridlinesResponse::from(lines.as_ref()))
        }
        Err(e) => forecast_error_response(&e),
    }
}
