//! Forcing API Service Library
//!
//! HTTP front end for the NWM forcing pipeline: forecast selection,
//! precipitation payloads, gridlines, session resume and the file list
//! builder.

pub mod config;
pub mod fetcher;
pub mod handlers;
pub mod params;
pub mod state;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the service router with its middleware.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Forecast selection
        .route("/set_time", post(handlers::forecast::set_time_handler))
        .route("/set_scales", post(handlers::forecast::set_scales_handler))
        // Payloads
        .route(
            "/get_forecast_precip",
            get(handlers::forecast::get_forecast_precip_handler)
                .post(handlers::forecast::post_forecast_precip_handler),
        )
        .route(
            "/get_forecasted_forcing_grid",
            get(handlers::grid::forcing_grid_handler),
        )
        .route(
            "/tryget_resume_session",
            get(handlers::session::resume_session_handler),
        )
        // Discovery
        .route("/file_list", post(handlers::files::file_list_handler))
        .route(
            "/latest_forecast",
            get(handlers::forecast::latest_forecast_handler),
        )
        // Health and metrics
        .route("/health", get(handlers::health::health_handler))
        .route("/ready", get(handlers::health::ready_handler))
        .route("/metrics", get(handlers::health::metrics_handler))
        // Middleware
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
