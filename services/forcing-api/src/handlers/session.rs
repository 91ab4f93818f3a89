//! Session resume handler.

use axum::{extract::Extension, http::StatusCode, response::Response};
use serde::Serialize;
use std::sync::Arc;

use super::{error_response, json_response};
use crate::state::{AppState, SessionPayload};

/// Everything a reloading map page needs to restore its view.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub selected_time: Option<String>,
    pub forecast_cycle: Option<u32>,
    pub lead_time: Option<u32>,
    #[serde(rename = "scaleX")]
    pub scale_x: usize,
    #[serde(rename = "scaleY")]
    pub scale_y: usize,
    #[serde(rename = "rowMin", skip_serializing_if = "Option::is_none")]
    pub row_min: Option<usize>,
    #[serde(rename = "rowMax", skip_serializing_if = "Option::is_none")]
    pub row_max: Option<usize>,
    #[serde(rename = "colMin", skip_serializing_if = "Option::is_none")]
    pub col_min: Option<usize>,
    #[serde(rename = "colMax", skip_serializing_if = "Option::is_none")]
    pub col_max: Option<usize>,
    pub range_mode: bool,
    pub lead_time_end: Option<u32>,
    pub forecasted_forcing_data_dict: SessionPayload,
}

/// GET /tryget_resume_session - Snapshot of the last served payload
pub async fn resume_session_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let session = state.session.read().await;
    let Some(payload) = session.last_payload.clone() else {
        return error_response(StatusCode::NOT_FOUND, "No session data found");
    };

    let selection = session.selection.as_ref();
    let snapshot = SessionSnapshot {
        selected_time: selection.map(|s| s.target_time.clone()),
        forecast_cycle: selection.map(|s| s.forecast_cycle),
        lead_time: selection.map(|s| s.lead_time),
        scale_x: session.scale.x,
        scale_y: session.scale.y,
        row_min: session.bbox.map(|b| b.row_min),
        row_max: session.bbox.map(|b| b.row_max),
        col_min: session.bbox.map(|b| b.col_min),
        col_max: session.bbox.map(|b| b.col_max),
        range_mode: session.range_mode,
        lead_time_end: session.lead_time_end,
        forecasted_forcing_data_dict: payload,
    };
    tracing::info!(
        selected_time = ?snapshot.selected_time,
        lead_time = ?snapshot.lead_time,
        "Resuming session"
    );
    json_response(StatusCode::OK, &snapshot)
}
