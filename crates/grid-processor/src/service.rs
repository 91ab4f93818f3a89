//! High-level forcing pipeline.
//!
//! `ForcingPipeline` wires the URL builder, loader, transforms and
//! materializer together for one configured forecast product, and owns
//! every memo cache they use.
//!
//! # Example
//!
//! ```rust,ignore
//! use grid_processor::{ForcingPipeline, ForcingQuery, PipelineConfig};
//!
//! let pipeline = ForcingPipeline::new(PipelineConfig::default(), fetcher)?;
//!
//! let query = ForcingQuery::new(date, 0, 1).with_scale(ScaleFactor::DEFAULT);
//! let payload = pipeline.timestep_payload(&query).await?;
//! println!("{} cells", payload.values.len());
//! ```

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Timelike, Utc};
use futures::future::try_join_all;
use nwm_common::{BoundingBox, ScaleFactor};
use nwm_urlgen::{ForecastRequest, ResourceIdentifier, RunType};
use projection::Transformer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::cache::MemoCache;
use crate::config::PipelineConfig;
use crate::dataset::ReferenceDataset;
use crate::error::{ForecastError, Result};
use crate::geometry::{gridlines, FrontendPayload, GeometryMaterializer, Gridlines, RangePayload};
use crate::loader::{DatasetLoader, LoadMode, ResourceFetcher};
use crate::transform::downsample;
use crate::types::{CacheStats, PrecipField};

/// One forecast field request: which file, and how to shape it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForcingQuery {
    pub date: NaiveDate,
    pub cycle: u32,
    pub lead_time: u32,
    pub scale: ScaleFactor,
    pub bbox: Option<BoundingBox>,
}

impl ForcingQuery {
    pub fn new(date: NaiveDate, cycle: u32, lead_time: u32) -> Self {
        Self {
            date,
            cycle,
            lead_time,
            scale: ScaleFactor::DEFAULT,
            bbox: None,
        }
    }

    pub fn with_scale(mut self, scale: ScaleFactor) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_bbox(mut self, bbox: Option<BoundingBox>) -> Self {
        self.bbox = bbox;
        self
    }

    pub fn at_lead_time(mut self, lead_time: u32) -> Self {
        self.lead_time = lead_time;
        self
    }
}

/// Memo key for range payloads; `lead_times` is sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeKey {
    pub date: NaiveDate,
    pub cycle: u32,
    pub lead_times: Vec<u32>,
    pub scale: ScaleFactor,
    pub bbox: Option<BoundingBox>,
}

/// A forecast found by [`ForcingPipeline::latest_available`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableForecast {
    pub date: NaiveDate,
    pub cycle: u32,
    pub lead_time: u32,
    pub identifier: ResourceIdentifier,
}

/// Statistics for every cache the pipeline owns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineCacheStats {
    pub fields: CacheStats,
    pub payloads: CacheStats,
    pub ranges: CacheStats,
    pub polygons: CacheStats,
    pub gridlines: CacheStats,
}

/// The forcing pipeline for one forecast product.
pub struct ForcingPipeline {
    config: PipelineConfig,
    loader: DatasetLoader,
    materializer: GeometryMaterializer,
    fields: MemoCache<ForcingQuery, PrecipField>,
    payloads: MemoCache<ForcingQuery, FrontendPayload>,
    ranges: MemoCache<RangeKey, RangePayload>,
    gridlines: MemoCache<ScaleFactor, Gridlines>,
}

impl ForcingPipeline {
    /// Create a pipeline; the configuration is validated first.
    pub fn new(config: PipelineConfig, fetcher: Arc<dyn ResourceFetcher>) -> Result<Self> {
        config.validate()?;
        let loader = DatasetLoader::new(fetcher)
            .with_timeout(config.load_timeout())
            .with_workers(config.effective_workers())
            .with_chunk_concurrency(config.chunk_concurrency);

        info!(
            run = %config.run,
            variable = %config.variable,
            geography = %config.geography,
            url_base = config.url_base.index(),
            workers = loader.workers(),
            "Forcing pipeline configured"
        );

        Ok(Self {
            materializer: GeometryMaterializer::new(config.base_cell_width, config.polygon_cache),
            fields: MemoCache::new("fields", config.field_cache),
            payloads: MemoCache::new("payloads", config.payload_cache),
            ranges: MemoCache::new("ranges", config.payload_cache),
            gridlines: MemoCache::new("gridlines", config.payload_cache),
            loader,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn loader(&self) -> &DatasetLoader {
        &self.loader
    }

    /// File request for the configured product with `.json` sidecars.
    pub fn file_request(
        &self,
        dates: Vec<NaiveDate>,
        cycles: Vec<u32>,
        lead_times: Vec<u32>,
    ) -> Result<ForecastRequest> {
        ForecastRequest::builder(self.config.run, self.config.variable, self.config.geography)
            .member(self.config.member)
            .dates(dates)
            .cycles(cycles)
            .lead_times(lead_times)
            .url_base(self.config.url_base)
            .append_json(true)
            .build()
    }

    /// Load exactly one forecast file.
    pub async fn load_forcing(
        &self,
        date: NaiveDate,
        cycle: u32,
        lead_time: u32,
    ) -> Result<ReferenceDataset> {
        let ids = self
            .file_request(vec![date], vec![cycle], vec![lead_time])?
            .create_file_list();
        match ids.as_slice() {
            [id] => self.loader.load(id).await,
            other => Err(ForecastError::load_failure(
                format!("{} t{:02}z f{:03}", date, cycle, lead_time),
                format!("expected exactly one file, got {}", other.len()),
            )),
        }
    }

    /// Load every file of a date range × cycles × lead times.
    pub async fn load_forcings(
        &self,
        start: &str,
        end: Option<&str>,
        cycles: Vec<u32>,
        lead_times: Vec<u32>,
        mode: LoadMode,
    ) -> Result<Vec<ReferenceDataset>> {
        let dates = nwm_common::date_range(start, end)?;
        let ids = self.file_request(dates, cycles, lead_times)?.create_file_list();
        self.loader.load_all(&ids, mode).await
    }

    /// Clipped, downsampled precipitation field with its transformer.
    #[instrument(skip(self, query), fields(date = %query.date, cycle = query.cycle, lead = query.lead_time))]
    pub async fn precip_field(&self, query: &ForcingQuery) -> Result<Arc<PrecipField>> {
        if let Some(field) = self.fields.get(query) {
            return Ok(field);
        }

        let dataset = self
            .load_forcing(query.date, query.cycle, query.lead_time)
            .await?;
        let grid = dataset
            .read_grid(&self.config.variable_name, query.bbox.as_ref())
            .await?;
        let grid = downsample(&grid, query.scale)?;
        let transformer = transformer_for(grid.crs(), dataset.id())?;

        debug!(shape = ?grid.shape(), "Built precipitation field");
        Ok(self.fields.insert(
            *query,
            PrecipField {
                grid,
                transformer,
                scale: query.scale,
            },
        ))
    }

    /// Payload for a single lead time.
    pub async fn timestep_payload(&self, query: &ForcingQuery) -> Result<Arc<FrontendPayload>> {
        if let Some(payload) = self.payloads.get(query) {
            return Ok(payload);
        }
        let started = Instant::now();
        let field = self.precip_field(query).await?;
        let payload = self.materializer.materialize(&field);
        metrics::histogram!("forcing_payload_seconds").record(started.elapsed().as_secs_f64());
        Ok(self.payloads.insert(*query, payload))
    }

    /// Payload for several lead times of one forecast.
    ///
    /// `query.lead_time` is ignored; `lead_times` is sorted and
    /// deduplicated and must not be empty.
    pub async fn timesteps_payload(
        &self,
        query: &ForcingQuery,
        lead_times: &[u32],
    ) -> Result<Arc<RangePayload>> {
        let mut leads = lead_times.to_vec();
        leads.sort_unstable();
        leads.dedup();
        if leads.is_empty() {
            return Err(ForecastError::invalid_configuration(
                "at least one lead time is required",
            ));
        }

        let key = RangeKey {
            date: query.date,
            cycle: query.cycle,
            lead_times: leads.clone(),
            scale: query.scale,
            bbox: query.bbox,
        };
        if let Some(payload) = self.ranges.get(&key) {
            return Ok(payload);
        }

        let started = Instant::now();
        let fields = try_join_all(
            leads
                .iter()
                .map(|&lead| self.precip_field_owned(query.at_lead_time(lead))),
        )
        .await?;
        let pairs: Vec<(u32, &PrecipField)> = leads
            .iter()
            .copied()
            .zip(fields.iter().map(|f| f.as_ref()))
            .collect();
        let payload = self.materializer.materialize_many(&pairs)?;
        metrics::histogram!("forcing_payload_seconds").record(started.elapsed().as_secs_f64());
        Ok(self.ranges.insert(key, payload))
    }

    async fn precip_field_owned(&self, query: ForcingQuery) -> Result<Arc<PrecipField>> {
        self.precip_field(&query).await
    }

    /// Grid lines for `scale` from the configured reference forecast.
    pub async fn gridlines(&self, scale: ScaleFactor) -> Result<Arc<Gridlines>> {
        if let Some(lines) = self.gridlines.get(&scale) {
            return Ok(lines);
        }
        let reference = &self.config.gridline_reference;
        let date = nwm_common::parse_forecast_date(&reference.date)?;
        let dataset = self
            .load_forcing(date, reference.cycle, reference.lead_time)
            .await?;
        let grid = dataset.read_grid(&self.config.variable_name, None).await?;
        let transformer = transformer_for(grid.crs(), dataset.id())?;
        Ok(self.gridlines.insert(scale, gridlines(&grid, &transformer, scale)))
    }

    /// Most recent forecast whose sidecar exists, walking back one hour
    /// at a time from `now` for at most `max_checks` probes.
    pub async fn latest_available(
        &self,
        now: DateTime<Utc>,
        max_checks: usize,
    ) -> Result<Option<AvailableForecast>> {
        let lead_time = if self.config.run == RunType::ShortRange { 1 } else { 0 };
        for step in 0..max_checks {
            let at = now - ChronoDuration::hours(step as i64);
            let date = at.date_naive();
            let cycle = at.hour();
            let request = self.file_request(vec![date], vec![cycle], vec![lead_time])?;
            let identifier = request.identifier(date, cycle, lead_time);
            if self.loader.exists(&identifier).await? {
                debug!(%identifier, checks = step + 1, "Found latest forecast");
                return Ok(Some(AvailableForecast {
                    date,
                    cycle,
                    lead_time,
                    identifier,
                }));
            }
        }
        Ok(None)
    }

    pub fn cache_stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            fields: self.fields.stats(),
            payloads: self.payloads.stats(),
            ranges: self.ranges.stats(),
            polygons: self.materializer.cache_stats(),
            gridlines: self.gridlines.stats(),
        }
    }

    /// Drop every memoized field and payload. Polygons are kept.
    pub fn clear_caches(&self) {
        self.fields.clear();
        self.payloads.clear();
        self.ranges.clear();
        self.gridlines.clear();
    }
}

fn transformer_for(crs: Option<&str>, id: &str) -> Result<Transformer> {
    let wkt = crs.ok_or_else(|| ForecastError::MissingProjection(id.to_string()))?;
    Ok(Transformer::from_crs(wkt)?)
}

impl std::fmt::Debug for ForcingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForcingPipeline")
            .field("config", &self.config)
            .field("loader", &self.loader)
            .finish()
    }
}
