//! Point geometry materialization.
//!
//! Turns processed grids into the map payload: one square polygon per
//! kept cell, reprojected to lon/lat, with the value(s) alongside.

use nwm_common::ScaleFactor;
use projection::{Point, Transformer};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use tracing::debug;

use crate::cache::{EvictionPolicy, MemoCache};
use crate::error::{ForecastError, Result};
use crate::types::{CacheStats, GridDataset, PrecipField};

/// Native NWM forcing grid pitch, in metres.
pub const DEFAULT_BASE_CELL_WIDTH: f64 = 1000.0;

/// Values at or below this magnitude are treated as no precipitation.
pub const SKIP_THRESHOLD: f32 = 1e-6;

/// Whether a cell is left out of the payload.
#[inline]
pub fn is_skippable(value: f32) -> bool {
    value.is_nan() || value.abs() <= SKIP_THRESHOLD
}

/// Memo key for one cell polygon.
///
/// Keyed by the cell centre rather than its indices so that differently
/// clipped windows never share an entry for different cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolygonKey {
    x_bits: u64,
    y_bits: u64,
    scale: ScaleFactor,
    width_bits: u64,
    crs: u64,
}

impl PolygonKey {
    pub fn new(x: f64, y: f64, scale: ScaleFactor, base_width: f64, crs: u64) -> Self {
        Self {
            x_bits: x.to_bits(),
            y_bits: y.to_bits(),
            scale,
            width_bits: base_width.to_bits(),
            crs,
        }
    }
}

/// Fingerprint of a projection string for cache keys.
pub fn crs_fingerprint(crs: Option<&str>) -> u64 {
    let mut hasher = DefaultHasher::new();
    crs.hash(&mut hasher);
    hasher.finish()
}

/// Axis-aligned square around a cell centre, in source units.
///
/// Vertex order: bottom-left, bottom-right, top-right, top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointGeometry {
    pub vertices: [Point; 4],
}

impl PointGeometry {
    pub fn new(x: f64, y: f64, half_width: f64, half_height: f64) -> Self {
        Self {
            vertices: [
                [x - half_width, y - half_height],
                [x + half_width, y - half_height],
                [x + half_width, y + half_height],
                [x - half_width, y + half_height],
            ],
        }
    }

    /// Square for a cell of a grid downsampled by `scale`.
    pub fn for_cell(x: f64, y: f64, scale: ScaleFactor, base_width: f64) -> Self {
        Self::new(
            x,
            y,
            base_width * scale.x as f64 / 2.0,
            base_width * scale.y as f64 / 2.0,
        )
    }

    pub fn reproject(&self, transformer: &Transformer) -> Vec<Point> {
        transformer.points_to_geographic(&self.vertices)
    }
}

/// Single lead time payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontendPayload {
    pub geometries: Vec<Vec<Point>>,
    pub values: Vec<f32>,
}

impl FrontendPayload {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Multi lead time payload.
///
/// Every list in `timestep_values` is aligned with `geometries`. NaN
/// values at kept cells serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangePayload {
    pub timestep_values: BTreeMap<u32, Vec<Option<f32>>>,
    pub geometries: Vec<Vec<Point>>,
}

/// Builds payloads, memoizing reprojected polygons.
#[derive(Debug)]
pub struct GeometryMaterializer {
    base_width: f64,
    polygons: MemoCache<PolygonKey, Vec<Point>>,
}

impl Default for GeometryMaterializer {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_CELL_WIDTH, EvictionPolicy::Unbounded)
    }
}

impl GeometryMaterializer {
    pub fn new(base_width: f64, policy: EvictionPolicy) -> Self {
        Self {
            base_width,
            polygons: MemoCache::new("polygons", policy),
        }
    }

    pub fn base_width(&self) -> f64 {
        self.base_width
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.polygons.stats()
    }

    /// Reprojected polygon for the cell centred on (x, y).
    pub fn point_geometry(
        &self,
        x: f64,
        y: f64,
        scale: ScaleFactor,
        transformer: &Transformer,
        crs: u64,
    ) -> Vec<Point> {
        let key = PolygonKey::new(x, y, scale, self.base_width, crs);
        let polygon = self.polygons.get_or_insert_with(key, || {
            PointGeometry::for_cell(x, y, scale, self.base_width).reproject(transformer)
        });
        polygon.as_ref().clone()
    }

    /// Payload for one field. Cells are visited t, then y, then x.
    pub fn materialize(&self, field: &PrecipField) -> FrontendPayload {
        let grid = &field.grid;
        let crs = crs_fingerprint(grid.crs());
        let (times, height, width) = grid.shape();

        let mut payload = FrontendPayload::default();
        for t in 0..times {
            for row in 0..height {
                for col in 0..width {
                    let value = grid.data()[grid.index(t, row, col)];
                    if is_skippable(value) {
                        continue;
                    }
                    payload.geometries.push(self.point_geometry(
                        grid.x()[col],
                        grid.y()[row],
                        field.scale,
                        &field.transformer,
                        crs,
                    ));
                    payload.values.push(value);
                }
            }
        }
        debug!(
            cells = times * height * width,
            kept = payload.len(),
            "Materialized payload"
        );
        payload
    }

    /// Payload for several lead times sharing one geometry list.
    ///
    /// A cell is kept when any lead time has a non-skippable value there.
    /// Lead times are sorted and deduplicated; the first field given for a
    /// lead time wins.
    pub fn materialize_many(&self, fields: &[(u32, &PrecipField)]) -> Result<RangePayload> {
        let mut by_lead: BTreeMap<u32, &PrecipField> = BTreeMap::new();
        for &(lead, field) in fields {
            by_lead.entry(lead).or_insert(field);
        }
        let first = by_lead
            .values()
            .next()
            .copied()
            .ok_or_else(|| ForecastError::invalid_configuration("no lead times to materialize"))?;

        let shape = first.grid.shape();
        for (&lead, field) in &by_lead {
            check_aligned(lead, field, first)?;
        }

        let (times, height, width) = shape;
        let grid: &GridDataset = &first.grid;
        let crs = crs_fingerprint(grid.crs());
        let mut payload = RangePayload {
            timestep_values: by_lead.keys().map(|&lead| (lead, Vec::new())).collect(),
            geometries: Vec::new(),
        };

        for t in 0..times {
            for row in 0..height {
                for col in 0..width {
                    let idx = grid.index(t, row, col);
                    let keep = by_lead
                        .values()
                        .any(|f| !is_skippable(f.grid.data()[idx]));
                    if !keep {
                        continue;
                    }
                    payload.geometries.push(self.point_geometry(
                        grid.x()[col],
                        grid.y()[row],
                        first.scale,
                        &first.transformer,
                        crs,
                    ));
                    for (lead, field) in &by_lead {
                        let value = field.grid.data()[idx];
                        if let Some(values) = payload.timestep_values.get_mut(lead) {
                            values.push((!value.is_nan()).then_some(value));
                        }
                    }
                }
            }
        }
        debug!(
            leads = by_lead.len(),
            kept = payload.geometries.len(),
            "Materialized range payload"
        );
        Ok(payload)
    }
}

/// Fields drawn with one geometry list must share shape, coordinates,
/// scale and projection.
fn check_aligned(lead: u32, field: &PrecipField, first: &PrecipField) -> Result<()> {
    let mismatch = |what: &str| {
        Err(ForecastError::invalid_configuration(format!(
            "lead time {} {} does not match the other lead times",
            lead, what
        )))
    };
    if field.grid.shape() != first.grid.shape() {
        return mismatch(&format!("shape {:?}", field.grid.shape()));
    }
    if field.scale != first.scale {
        return mismatch(&format!("scale {}", field.scale));
    }
    if field.grid.x() != first.grid.x() || field.grid.y() != first.grid.y() {
        return mismatch("grid coordinates");
    }
    if field.grid.crs() != first.grid.crs() {
        return mismatch("projection");
    }
    Ok(())
}

/// Grid lines sampled from a full-resolution grid, in lon/lat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gridlines {
    pub horizontal: Vec<Vec<Point>>,
    pub vertical: Vec<Vec<Point>>,
}

/// Lines through every `scale.y`-th row and every `scale.x`-th column.
pub fn gridlines(grid: &GridDataset, transformer: &Transformer, scale: ScaleFactor) -> Gridlines {
    let rows: Vec<usize> = (0..grid.height()).step_by(scale.y.max(1)).collect();
    let cols: Vec<usize> = (0..grid.width()).step_by(scale.x.max(1)).collect();
    let point = |row: usize, col: usize| transformer.to_geographic(grid.x()[col], grid.y()[row]);

    Gridlines {
        horizontal: rows
            .iter()
            .map(|&r| cols.iter().map(|&c| point(r, c)).collect())
            .collect(),
        vertical: cols
            .iter()
            .map(|&c| rows.iter().map(|&r| point(r, c)).collect())
            .collect(),
    }
}
