//! Forecast selection and precipitation payload handlers.

use axum::{extract::Extension, http::StatusCode, response::Response};
use bytes::Bytes;
use chrono::Utc;
use grid_processor::{BoundingBox, ForcingQuery, ForecastError, PipelineConfig, ScaleFactor};
use nwm_urlgen::default_entry;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::{error_response, forecast_error_response, json_response, message_response, parse_body};
use crate::params::{opt_bool, opt_string, opt_u32, opt_usize};
use crate::state::{AppState, ForecastSelection, SessionPayload};

/// Body of `POST /set_time`.
#[derive(Debug, Default, Deserialize)]
pub struct SetTimeRequest {
    #[serde(default, alias = "selected_time", deserialize_with = "opt_string")]
    pub target_time: Option<String>,
    #[serde(default, deserialize_with = "opt_u32")]
    pub forecast_cycle: Option<u32>,
    #[serde(default, deserialize_with = "opt_u32")]
    pub lead_time: Option<u32>,
}

/// Body of `POST /set_scales`.
#[derive(Debug, Default, Deserialize)]
pub struct SetScalesRequest {
    #[serde(default, rename = "scaleX", deserialize_with = "opt_usize")]
    pub scale_x: Option<usize>,
    #[serde(default, rename = "scaleY", deserialize_with = "opt_usize")]
    pub scale_y: Option<usize>,
}

/// Body of `POST /get_forecast_precip`. Absent selection fields fall
/// back to the session.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPrecipRequest {
    #[serde(default, alias = "target_time", rename = "selected_time", deserialize_with = "opt_string")]
    pub selected_time: Option<String>,
    #[serde(default, rename = "forecast_cycle", deserialize_with = "opt_u32")]
    pub forecast_cycle: Option<u32>,
    #[serde(default, rename = "lead_time", deserialize_with = "opt_u32")]
    pub lead_time: Option<u32>,
    #[serde(default, rename = "scaleX", deserialize_with = "opt_usize")]
    pub scale_x: Option<usize>,
    #[serde(default, rename = "scaleY", deserialize_with = "opt_usize")]
    pub scale_y: Option<usize>,
    #[serde(default, deserialize_with = "opt_usize")]
    pub row_min: Option<usize>,
    #[serde(default, deserialize_with = "opt_usize")]
    pub row_max: Option<usize>,
    #[serde(default, deserialize_with = "opt_usize")]
    pub col_min: Option<usize>,
    #[serde(default, deserialize_with = "opt_usize")]
    pub col_max: Option<usize>,
    #[serde(default, rename = "lead_time_end", deserialize_with = "opt_u32")]
    pub lead_time_end: Option<u32>,
    #[serde(default, rename = "range_mode", deserialize_with = "opt_bool")]
    pub range_mode: Option<bool>,
}

/// Range cap for products missing from the default table; the longest
/// NWM forecast runs 720 hours.
const FALLBACK_MAX_LEAD_TIME: u32 = 720;

/// Largest lead time the configured product publishes.
fn max_lead_time(config: &PipelineConfig) -> u32 {
    default_entry(config.run, config.variable, config.geography, config.member)
        .and_then(|entry| entry.lead_times.last())
        .unwrap_or(FALLBACK_MAX_LEAD_TIME)
}

/// A fully resolved payload request.
#[derive(Debug, Clone, PartialEq)]
struct PayloadPlan {
    selection: ForecastSelection,
    scale: ScaleFactor,
    bbox: Option<BoundingBox>,
    range_mode: bool,
    lead_time_end: Option<u32>,
}

impl PayloadPlan {
    fn query(&self) -> ForcingQuery {
        ForcingQuery::new(
            self.selection.date,
            self.selection.forecast_cycle,
            self.selection.lead_time,
        )
        .with_scale(self.scale)
        .with_bbox(self.bbox)
    }

    /// Lead times for range mode, or `None` for a single lead. The range
    /// must end at or before `max_lead`.
    fn range_lead_times(&self, max_lead: u32) -> Result<Option<Vec<u32>>, ForecastError> {
        match (self.range_mode, self.lead_time_end) {
            (true, Some(end)) if end < self.selection.lead_time => {
                Err(ForecastError::InvalidRequest(format!(
                    "lead_time_end {} is before lead_time {}",
                    end, self.selection.lead_time
                )))
            }
            (true, Some(end)) if end > max_lead => Err(ForecastError::InvalidRequest(format!(
                "lead_time_end {} is past the last lead time {}",
                end, max_lead
            ))),
            (true, Some(end)) => Ok(Some((self.selection.lead_time..=end).collect())),
            _ => Ok(None),
        }
    }
}

/// POST /set_time - Select the forecast to display
pub async fn set_time_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Response {
    metrics::counter!("forcing_api_requests_total", "endpoint" => "set_time").increment(1);
    match set_time(&state, &body).await {
        Ok(response) => response,
        Err(e) => forecast_error_response(&e),
    }
}

async fn set_time(state: &AppState, body: &Bytes) -> Result<Response, ForecastError> {
    let request: SetTimeRequest = parse_body(body)?;

    let mut missing = Vec::new();
    if request.target_time.is_none() {
        missing.push("target_time");
    }
    if request.forecast_cycle.is_none() {
        missing.push("forecast_cycle");
    }
    if request.lead_time.is_none() {
        missing.push("lead_time");
    }
    let (Some(target_time), Some(cycle), Some(lead_time)) =
        (request.target_time, request.forecast_cycle, request.lead_time)
    else {
        return Err(ForecastError::InvalidRequest(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    };

    let selection = select(target_time, cycle, lead_time)?;
    info!(
        date = %selection.date,
        cycle = selection.forecast_cycle,
        lead_time = selection.lead_time,
        "Forecast selection set"
    );
    state.session.write().await.selection = Some(selection);
    Ok(message_response("Forecast arguments set successfully"))
}

/// POST /set_scales - Set the downsampling factors
pub async fn set_scales_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Response {
    metrics::counter!("forcing_api_requests_total", "endpoint" => "set_scales").increment(1);
    let request: SetScalesRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return forecast_error_response(&e),
    };
    let (Some(x), Some(y)) = (request.scale_x, request.scale_y) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: scaleX, scaleY",
        );
    };
    let scale = match ScaleFactor::new(x, y) {
        Ok(scale) => scale,
        Err(e) => return forecast_error_response(&e),
    };

    info!(scale = %scale, "Scales set");
    state.session.write().await.scale = scale;
    message_response("Scales set successfully")
}

/// GET /get_forecast_precip - Payload for the session's selection
pub async fn get_forecast_precip_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    metrics::counter!("forcing_api_requests_total", "endpoint" => "get_forecast_precip")
        .increment(1);
    let plan = {
        let session = state.session.read().await;
        match &session.selection {
            Some(selection) => PayloadPlan {
                selection: selection.clone(),
                scale: session.scale,
                bbox: session.bbox,
                range_mode: session.range_mode,
                lead_time_end: session.lead_time_end,
            },
            None => {
                return forecast_error_response(&ForecastError::InvalidRequest(
                    "Forecast arguments not set".to_string(),
                ))
            }
        }
    };
    serve_plan(&state, plan).await
}

/// POST /get_forecast_precip - Payload for an explicit request
pub async fn post_forecast_precip_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Response {
    metrics::counter!("forcing_api_requests_total", "endpoint" => "post_forecast_precip")
        .increment(1);
    let request: ForecastPrecipRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return forecast_error_response(&e),
    };
    let plan = {
        let session = state.session.read().await;
        resolve_plan(request, session.selection.as_ref(), session.scale)
    };
    match plan {
        Ok(plan) => serve_plan(&state, plan).await,
        Err(e) => forecast_error_response(&e),
    }
}

/// Merge a request with the current session.
fn resolve_plan(
    request: ForecastPrecipRequest,
    current: Option<&ForecastSelection>,
    current_scale: ScaleFactor,
) -> Result<PayloadPlan, ForecastError> {
    let bbox = BoundingBox::from_optional(
        request.row_min,
        request.row_max,
        request.col_min,
        request.col_max,
    )?;

    let target_time = request
        .selected_time
        .or_else(|| current.map(|s| s.target_time.clone()));
    let cycle = request
        .forecast_cycle
        .or_else(|| current.map(|s| s.forecast_cycle));
    let lead_time = request.lead_time.or_else(|| current.map(|s| s.lead_time));
    let (Some(target_time), Some(cycle), Some(lead_time)) = (target_time, cycle, lead_time) else {
        return Err(ForecastError::InvalidRequest(
            "Forecast arguments not set".to_string(),
        ));
    };

    let scale = ScaleFactor::new(
        request.scale_x.unwrap_or(current_scale.x),
        request.scale_y.unwrap_or(current_scale.y),
    )?;

    Ok(PayloadPlan {
        selection: select(target_time, cycle, lead_time)?,
        scale,
        bbox,
        range_mode: request.range_mode.unwrap_or(false),
        lead_time_end: request.lead_time_end,
    })
}

fn select(target_time: String, cycle: u32, lead_time: u32) -> Result<ForecastSelection, ForecastError> {
    if cycle > 23 {
        return Err(ForecastError::InvalidRequest(format!(
            "forecast_cycle {} is not a UTC hour",
            cycle
        )));
    }
    let date = nwm_common::parse_forecast_date(&target_time)?;
    Ok(ForecastSelection {
        target_time,
        date,
        forecast_cycle: cycle,
        lead_time,
    })
}

/// Compute the payload for `plan`, then record it in the session.
async fn serve_plan(state: &AppState, plan: PayloadPlan) -> Response {
    let started = Instant::now();
    let payload = match compute(state, &plan).await {
        Ok(payload) => payload,
        Err(e) => return forecast_error_response(&e),
    };

    info!(
        date = %plan.selection.date,
        cycle = plan.selection.forecast_cycle,
        lead_time = plan.selection.lead_time,
        range = plan.lead_time_end.filter(|_| plan.range_mode),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Forecast precipitation served"
    );

    let response = json_response(StatusCode::OK, &payload);
    let mut session = state.session.write().await;
    session.selection = Some(plan.selection);
    session.scale = plan.scale;
    session.bbox = plan.bbox;
    session.range_mode = plan.range_mode;
    session.lead_time_end = plan.lead_time_end;
    session.last_payload = Some(payload);
    response
}

async fn compute(state: &AppState, plan: &PayloadPlan) -> Result<SessionPayload, ForecastError> {
    let query = plan.query();
    match plan.range_lead_times(max_lead_time(state.pipeline.config()))? {
        Some(leads) => Ok(SessionPayload::Range(
            state.pipeline.timesteps_payload(&query, &leads).await?,
        )),
        None => Ok(SessionPayload::Timestep(
            state.pipeline.timestep_payload(&query).await?,
        )),
    }
}

/// GET /latest_forecast - Most recent forecast file that exists
pub async fn latest_forecast_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    metrics::counter!("forcing_api_requests_total", "endpoint" => "latest_forecast").increment(1);
    let max_checks = state.config.latest_max_checks;
    match state.pipeline.latest_available(Utc::now(), max_checks).await {
        Ok(Some(found)) => json_response(StatusCode::OK, &found),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &format!("No forecast found in the last {} hours", max_checks),
        ),
        Err(e) => forecast_error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> ForecastPrecipRequest {
        serde_json::from_value(value).unwrap()
    }

    fn current() -> ForecastSelection {
        select("20240601".to_string(), 6, 3).unwrap()
    }

    #[test]
    fn test_request_field_names() {
        let r = request(json!({
            "selected_time": "202406011200", "forecast_cycle": "6", "lead_time": 2,
            "scaleX": 4, "scaleY": "8", "rowMin": 0, "rowMax": 10, "colMin": 0, "colMax": 12,
            "lead_time_end": 5, "range_mode": true
        }));
        assert_eq!(r.selected_time.as_deref(), Some("202406011200"));
        assert_eq!(r.forecast_cycle, Some(6));
        assert_eq!(r.scale_y, Some(8));
        assert_eq!(r.row_max, Some(10));
        assert_eq!(r.col_max, Some(12));
        assert_eq!(r.range_mode, Some(true));

        let r = request(json!({"target_time": "20240601"}));
        assert_eq!(r.selected_time.as_deref(), Some("20240601"));
    }

    #[test]
    fn test_resolve_falls_back_to_session() {
        let plan = resolve_plan(request(json!({"lead_time": 7})), Some(&current()), ScaleFactor::DEFAULT)
            .unwrap();
        assert_eq!(plan.selection.forecast_cycle, 6);
        assert_eq!(plan.selection.lead_time, 7);
        assert_eq!(plan.scale, ScaleFactor::DEFAULT);
        assert_eq!(plan.range_lead_times(18).unwrap(), None);
    }

    #[test]
    fn test_resolve_without_session() {
        let err = resolve_plan(request(json!({"lead_time": 7})), None, ScaleFactor::DEFAULT)
            .unwrap_err();
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_partial_bbox_rejected() {
        let err = resolve_plan(
            request(json!({"rowMin": 0, "rowMax": 4})),
            Some(&current()),
            ScaleFactor::DEFAULT,
        )
        .unwrap_err();
        assert!(matches!(err, ForecastError::InvalidBoundingBox(_)));
    }

    #[test]
    fn test_range_lead_times() {
        let plan = resolve_plan(
            request(json!({"lead_time_end": 6, "range_mode": true})),
            Some(&current()),
            ScaleFactor::DEFAULT,
        )
        .unwrap();
        assert_eq!(plan.range_lead_times(18).unwrap(), Some(vec![3, 4, 5, 6]));
        assert_eq!(plan.range_lead_times(6).unwrap(), Some(vec![3, 4, 5, 6]));
        assert!(matches!(
            plan.range_lead_times(5),
            Err(ForecastError::InvalidRequest(_))
        ));

        let plan = resolve_plan(
            request(json!({"lead_time_end": u32::MAX, "range_mode": true})),
            Some(&current()),
            ScaleFactor::DEFAULT,
        )
        .unwrap();
        assert!(matches!(
            plan.range_lead_times(18),
            Err(ForecastError::InvalidRequest(_))
        ));

        // lead_time_end alone does not enable range mode.
        let plan = resolve_plan(request(json!({"lead_time_end": 6})), Some(&current()), ScaleFactor::DEFAULT)
            .unwrap();
        assert_eq!(plan.range_lead_times(18).unwrap(), None);

        let plan = resolve_plan(
            request(json!({"lead_time_end": 1, "range_mode": true})),
            Some(&current()),
            ScaleFactor::DEFAULT,
        )
        .unwrap();
        assert!(plan.range_lead_times(18).is_err());
    }

    #[test]
    fn test_max_lead_time_follows_product() {
        let mut config = PipelineConfig::default();
        assert_eq!(max_lead_time(&config), 18);
        config.geography = nwm_urlgen::Geography::Hawaii;
        assert_eq!(max_lead_time(&config), 48);
    }

    #[test]
    fn test_select_validates() {
        assert!(select("2024-06-01".to_string(), 0, 1).is_err());
        assert!(select("20240601".to_string(), 24, 1).is_err());
        assert_eq!(current().date.to_string(), "2024-06-01");
    }
}
