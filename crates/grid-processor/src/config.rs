//! Configuration for the forcing pipeline.

use nwm_urlgen::{EnsembleMember, Geography, RunType, UrlBase, Variable};
use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicy;
use crate::error::{ForecastError, Result};

/// Configuration for [`ForcingPipeline`](crate::ForcingPipeline).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Forecast product served by the pipeline.
    pub run: RunType,
    pub variable: Variable,
    pub geography: Geography,
    pub member: Option<EnsembleMember>,

    /// Host prefix for generated identifiers.
    pub url_base: UrlBase,

    /// Precipitation variable read from each dataset.
    pub variable_name: String,

    /// Native grid pitch in projection units; polygons are sized from it.
    pub base_cell_width: f64,

    /// Per-load timeout in seconds.
    pub load_timeout_secs: u64,

    /// Concurrent loads in parallel mode. 0 means one per physical core.
    pub workers: usize,

    /// Concurrent chunk fetches inside one grid read.
    pub chunk_concurrency: usize,

    pub field_cache: EvictionPolicy,
    pub payload_cache: EvictionPolicy,
    pub polygon_cache: EvictionPolicy,

    /// Forecast whose full-resolution grid is used for gridlines.
    pub gridline_reference: GridlineReference,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run: RunType::ShortRange,
            variable: Variable::Forcing,
            geography: Geography::Conus,
            member: None,
            url_base: UrlBase::CirohZarrCopy,
            variable_name: "RAINRATE".to_string(),
            base_cell_width: 1000.0,
            load_timeout_secs: 60,
            workers: 0,
            chunk_concurrency: 8,
            field_cache: EvictionPolicy::Unbounded,
            payload_cache: EvictionPolicy::Unbounded,
            polygon_cache: EvictionPolicy::Unbounded,
            gridline_reference: GridlineReference::default(),
        }
    }
}

/// A fixed forecast used as the gridline source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridlineReference {
    /// `YYYYMMDD`
    pub date: String,
    pub cycle: u32,
    pub lead_time: u32,
}

impl Default for GridlineReference {
    fn default() -> Self {
        Self {
            date: "20230101".to_string(),
            cycle: 0,
            lead_time: 1,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `NWM_*` environment variables to this configuration.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(val) = std::env::var("NWM_RUN_TYPE") {
            self.run = val.parse()?;
        }
        if let Ok(val) = std::env::var("NWM_VARIABLE") {
            self.variable = val.parse()?;
        }
        if let Ok(val) = std::env::var("NWM_GEOGRAPHY") {
            self.geography = val.parse()?;
        }
        if let Ok(val) = std::env::var("NWM_MEMBER") {
            self.member = if val.trim().is_empty() {
                None
            } else {
                Some(val.parse()?)
            };
        }
        if let Ok(val) = std::env::var("NWM_URL_BASE") {
            let index = val.parse::<u8>().map_err(|_| {
                ForecastError::invalid_configuration(format!("NWM_URL_BASE must be 0-8: {}", val))
            })?;
            self.url_base = UrlBase::from_index(index)?;
        }
        if let Ok(val) = std::env::var("NWM_VARIABLE_NAME") {
            self.variable_name = val;
        }
        if let Ok(val) = std::env::var("NWM_BASE_CELL_WIDTH") {
            if let Ok(width) = val.parse() {
                self.base_cell_width = width;
            }
        }
        if let Ok(val) = std::env::var("NWM_LOAD_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.load_timeout_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("NWM_WORKERS") {
            if let Ok(workers) = val.parse() {
                self.workers = workers;
            }
        }
        if let Ok(val) = std::env::var("NWM_CHUNK_CONCURRENCY") {
            if let Ok(n) = val.parse() {
                self.chunk_concurrency = n;
            }
        }
        if let Ok(val) = std::env::var("NWM_FIELD_CACHE") {
            self.field_cache = val.parse()?;
        }
        if let Ok(val) = std::env::var("NWM_PAYLOAD_CACHE") {
            self.payload_cache = val.parse()?;
        }
        if let Ok(val) = std::env::var("NWM_POLYGON_CACHE") {
            self.polygon_cache = val.parse()?;
        }
        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.variable_name.trim().is_empty() {
            return Err(ForecastError::invalid_configuration(
                "variable_name must not be empty",
            ));
        }
        if !(self.base_cell_width.is_finite() && self.base_cell_width > 0.0) {
            return Err(ForecastError::invalid_configuration(
                "base_cell_width must be > 0",
            ));
        }
        if self.load_timeout_secs == 0 {
            return Err(ForecastError::invalid_configuration(
                "load_timeout_secs must be > 0",
            ));
        }
        if self.chunk_concurrency == 0 {
            return Err(ForecastError::invalid_configuration(
                "chunk_concurrency must be > 0",
            ));
        }
        if self.gridline_reference.cycle > 23 {
            return Err(ForecastError::invalid_configuration(
                "gridline_reference.cycle must be 0-23",
            ));
        }
        nwm_common::parse_forecast_date(&self.gridline_reference.date)?;
        nwm_urlgen::validate_combination(self.run, self.variable, self.geography, self.member)?;
        Ok(())
    }

    /// Worker count with the physical-core default resolved.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get_physical().max(1)
        } else {
            self.workers
        }
    }

    pub fn load_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.load_timeout_secs)
    }
}
