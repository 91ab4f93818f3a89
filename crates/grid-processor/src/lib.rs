//! NWM forcing grid processing.
//!
//! This crate turns NWM forecast reference sidecars into map payloads:
//!
//! - **Lazy loading**: a load only fetches the kerchunk sidecar; chunk
//!   bytes are fetched when a window is read
//! - **Partial reads**: only chunks intersecting the requested rows and
//!   columns are fetched and decoded
//! - **Explicit caches**: fields, payloads and polygons are memoized in
//!   caches owned by the pipeline, with configurable eviction
//!
//! # Architecture
//!
//! ```text
//! ForcingQuery (date, cycle, lead, scale, bbox)
//!      │
//!      ▼
//! nwm-urlgen: ResourceIdentifier (.json sidecar)
//!      │
//!      ▼
//! DatasetLoader::load ──► ResourceFetcher (memory / file / http)
//!      │
//!      ▼
//! ReferenceDataset::read_grid(bbox)
//!      │
//!      ├─► chunks intersecting the window, fetched by byte range
//!      ├─► zarrs decode (zlib, shuffle), CF fill/scale
//!      │
//!      ▼
//! transform::downsample (block mean, trim)
//!      │
//!      ▼
//! GeometryMaterializer ──► FrontendPayload / RangePayload (lon/lat)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{ForcingPipeline, ForcingQuery, MemoryFetcher, PipelineConfig};
//!
//! let fetcher = Arc::new(MemoryFetcher::new());
//! let pipeline = ForcingPipeline::new(PipelineConfig::default(), fetcher)?;
//!
//! let query = ForcingQuery::new(date, 0, 1);
//! let payload = pipeline.timestep_payload(&query).await?;
//! for (polygon, value) in payload.geometries.iter().zip(&payload.values) {
//!     // ...
//! }
//! ```

pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod loader;
pub mod reference;
pub mod service;
pub mod testdata;
pub mod transform;
pub mod types;

// Re-export commonly used types at crate root
pub use cache::{EvictionPolicy, MemoCache};
pub use config::{GridlineReference, PipelineConfig};
pub use dataset::ReferenceDataset;
pub use error::{ForecastError, Result};
pub use geometry::{
    gridlines, is_skippable, FrontendPayload, GeometryMaterializer, Gridlines, PointGeometry,
    PolygonKey, RangePayload, DEFAULT_BASE_CELL_WIDTH,
};
pub use loader::{DatasetLoader, FileFetcher, LoadMode, MemoryFetcher, ResourceFetcher};
pub use reference::{ChunkRef, ReferenceSet, ReferenceStore};
pub use service::{AvailableForecast, ForcingPipeline, ForcingQuery, PipelineCacheStats, RangeKey};
pub use transform::{clip, clip_then_downsample, downsample, merge_time};
pub use types::{CacheStats, GridDataset, PrecipField};

pub use nwm_common::{BoundingBox, ScaleFactor};
