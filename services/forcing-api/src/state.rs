//! Application state for the forcing API.

use anyhow::Result;
use chrono::NaiveDate;
use grid_processor::{
    BoundingBox, ForcingPipeline, FrontendPayload, RangePayload, ResourceFetcher, ScaleFactor,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::ServiceConfig;

/// Shared application state.
pub struct AppState {
    /// Forcing pipeline and its caches.
    pub pipeline: Arc<ForcingPipeline>,

    /// Map session: current selection and the last payload served.
    pub session: RwLock<SessionState>,

    pub config: ServiceConfig,

    /// Renders `/metrics`; absent when no recorder is installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: ServiceConfig, fetcher: Arc<dyn ResourceFetcher>) -> Result<Self> {
        let pipeline = ForcingPipeline::new(config.pipeline.clone(), fetcher)?;
        Ok(Self {
            pipeline: Arc::new(pipeline),
            session: RwLock::new(SessionState::default()),
            config,
            prometheus: None,
        })
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// Forecast selected through `/set_time` or a precipitation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastSelection {
    /// Date string as the client sent it.
    pub target_time: String,
    pub date: NaiveDate,
    pub forecast_cycle: u32,
    pub lead_time: u32,
}

/// The map session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub selection: Option<ForecastSelection>,
    pub scale: ScaleFactor,
    pub bbox: Option<BoundingBox>,
    pub range_mode: bool,
    pub lead_time_end: Option<u32>,
    pub last_payload: Option<SessionPayload>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            selection: None,
            scale: ScaleFactor::DEFAULT,
            bbox: None,
            range_mode: false,
            lead_time_end: None,
            last_payload: None,
        }
    }
}

impl SessionState {
    /// Lead times to serve, or `None` for single-lead mode.
    pub fn range_lead_times(&self) -> Option<Vec<u32>> {
        let selection = self.selection.as_ref()?;
        match (self.range_mode, self.lead_time_end) {
            (true, Some(end)) => Some((selection.lead_time..=end).collect()),
            _ => None,
        }
    }
}

/// A payload kept for session resume.
#[derive(Debug, Clone)]
pub enum SessionPayload {
    Timestep(Arc<FrontendPayload>),
    Range(Arc<RangePayload>),
}

impl Serialize for SessionPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SessionPayload::Timestep(payload) => payload.as_ref().serialize(serializer),
            SessionPayload::Range(payload) => payload.as_ref().serialize(serializer),
        }
    }
}
