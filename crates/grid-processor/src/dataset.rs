//! Lazy dataset backed by a reference set.
//!
//! Arrays are opened with zarrs over a [`ReferenceStore`], so reading a
//! window only fetches the chunks that intersect it:
//!
//! ```text
//! read_grid(var, bbox)
//!      │
//!      ├─► Array::async_open (.zarray/.zattrs, inline)
//!      ├─► window → ArraySubset
//!      ├─► retrieve subset, `chunk_concurrency` fetches in flight
//!      └─► CF decode (fill → NaN, scale_factor, add_offset)
//! ```

use nwm_common::BoundingBox;
use serde_json::{Map, Value};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use zarrs::array::{Array, ArrayError, DataType};
use zarrs::array_subset::ArraySubset;

use crate::error::{ForecastError, Result};
use crate::loader::ResourceFetcher;
use crate::reference::{number, ReferenceSet, ReferenceStore};
use crate::types::GridDataset;

/// Variable that conventionally carries the grid mapping.
pub const CRS_VARIABLE: &str = "crs";

/// Attributes that may hold a projection WKT, in lookup order.
pub const PROJECTION_ATTRIBUTES: [&str; 3] = ["esri_pe_string", "spatial_ref", "crs_wkt"];

/// A loaded, not yet materialized dataset.
#[derive(Clone)]
pub struct ReferenceDataset {
    id: String,
    refs: Arc<ReferenceSet>,
    fetcher: Arc<dyn ResourceFetcher>,
    chunk_concurrency: usize,
    timeout: Duration,
}

/// An opened array and the store it reads through.
struct OpenArray {
    store: Arc<ReferenceStore>,
    array: Array<ReferenceStore>,
}

impl OpenArray {
    fn shape(&self) -> Vec<usize> {
        self.array.shape().iter().map(|&s| s as usize).collect()
    }
}

impl ReferenceDataset {
    pub fn new(
        id: impl Into<String>,
        refs: ReferenceSet,
        fetcher: Arc<dyn ResourceFetcher>,
        chunk_concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            refs: Arc::new(refs),
            fetcher,
            chunk_concurrency: chunk_concurrency.max(1),
            timeout,
        }
    }

    /// Identifier the dataset was loaded from.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn references(&self) -> &ReferenceSet {
        &self.refs
    }

    pub fn variables(&self) -> Vec<String> {
        self.refs.variables()
    }

    pub fn attributes(&self, variable: &str) -> Result<Map<String, Value>> {
        self.refs.attributes(variable)
    }

    /// Open `variable` with a fresh store, so chunk bytes live only as
    /// long as one read.
    async fn open(&self, variable: &str) -> Result<OpenArray> {
        // Missing variables and remote metadata are reported before zarrs
        // sees the key.
        self.refs.array_metadata(variable)?;
        let store = Arc::new(ReferenceStore::new(
            Arc::clone(&self.refs),
            Arc::clone(&self.fetcher),
            self.chunk_concurrency,
            self.timeout,
        ));
        let array = Array::async_open(Arc::clone(&store), &format!("/{}", variable))
            .await
            .map_err(|e| self.zarr_error(&store, variable, e))?;
        Ok(OpenArray { store, array })
    }

    fn zarr_error(
        &self,
        store: &ReferenceStore,
        variable: &str,
        error: impl std::fmt::Display,
    ) -> ForecastError {
        store
            .take_failure()
            .unwrap_or_else(|| ForecastError::load_failure(&self.id, format!("{}: {}", variable, error)))
    }

    /// Dimension names of a variable from `_ARRAY_DIMENSIONS`.
    pub async fn dimensions(&self, variable: &str) -> Result<Vec<String>> {
        let opened = self.open(variable).await?;
        self.dimension_names(variable, opened.array.dimensionality())
    }

    fn dimension_names(&self, variable: &str, ndim: usize) -> Result<Vec<String>> {
        let attrs = self.refs.attributes(variable)?;
        let dims: Option<Vec<String>> = attrs
            .get("_ARRAY_DIMENSIONS")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|d| d.as_str().map(str::to_string)).collect());

        match dims {
            Some(dims) if dims.len() == ndim => Ok(dims),
            Some(dims) => Err(ForecastError::load_failure(
                &self.id,
                format!(
                    "{} has {} dimension names for {} dimensions",
                    variable,
                    dims.len(),
                    ndim
                ),
            )),
            None => Ok((0..ndim).map(|i| format!("dim_{}", i)).collect()),
        }
    }

    /// Projection WKT for `main_variable`.
    ///
    /// Looks at the grid-mapping variable first (the one named by the main
    /// variable's `grid_mapping` attribute, else `crs`), then the main
    /// variable itself.
    pub fn projection(&self, main_variable: &str) -> Result<String> {
        let main_attrs = self.refs.attributes(main_variable)?;
        let mapping = main_attrs
            .get("grid_mapping")
            .and_then(Value::as_str)
            .unwrap_or(CRS_VARIABLE)
            .to_string();

        let mapping_attrs = self.refs.attributes(&mapping)?;
        for attrs in [&mapping_attrs, &main_attrs] {
            for key in PROJECTION_ATTRIBUTES {
                if let Some(wkt) = attrs.get(key).and_then(Value::as_str) {
                    if !wkt.trim().is_empty() {
                        return Ok(wkt.to_string());
                    }
                }
            }
        }
        Err(ForecastError::MissingProjection(format!(
            "{}: no projection attribute on {} or {}",
            self.id, mapping, main_variable
        )))
    }

    /// Read the raw (not CF-decoded) values of `variable` in the given
    /// per-dimension index ranges, in C order.
    pub async fn read_array(&self, variable: &str, window: &[Range<usize>]) -> Result<Vec<f64>> {
        let opened = self.open(variable).await?;
        self.read_window(&opened, variable, window).await
    }

    async fn read_window(
        &self,
        opened: &OpenArray,
        variable: &str,
        window: &[Range<usize>],
    ) -> Result<Vec<f64>> {
        let shape = opened.shape();
        if window.len() != shape.len() {
            return Err(ForecastError::invalid_configuration(format!(
                "{} has {} dimensions, window has {}",
                variable,
                shape.len(),
                window.len()
            )));
        }
        for (dim, (r, &size)) in window.iter().zip(&shape).enumerate() {
            if r.start >= r.end || r.end > size {
                return Err(ForecastError::invalid_bbox(format!(
                    "{} window {:?} on dimension {} is outside 0..{}",
                    variable, r, dim, size
                )));
            }
        }

        let ranges: Vec<Range<u64>> = window
            .iter()
            .map(|r| r.start as u64..r.end as u64)
            .collect();
        let subset = ArraySubset::new_with_ranges(&ranges);
        debug!(variable = variable, window = ?window, "Reading array subset");

        retrieve_as_f64(&opened.array, &subset)
            .await
            .map_err(|e| self.zarr_error(&opened.store, variable, e))
    }

    /// Read a whole 1-D coordinate variable, CF-decoded.
    pub async fn read_coordinate(&self, name: &str) -> Result<Vec<f64>> {
        let opened = self.open(name).await?;
        let shape = opened.shape();
        if shape.len() != 1 {
            return Err(ForecastError::invalid_configuration(format!(
                "coordinate {} must be 1-D, has {} dimensions",
                name,
                shape.len()
            )));
        }
        if shape[0] == 0 {
            return Ok(Vec::new());
        }
        let raw = self.read_window(&opened, name, &[0..shape[0]]).await?;
        let cf = self.cf_decoding(name)?;
        Ok(raw.into_iter().map(|v| cf.apply(v)).collect())
    }

    fn cf_decoding(&self, variable: &str) -> Result<CfDecoding> {
        Ok(CfDecoding::from_attributes(
            self.refs.fill_value(variable)?,
            &self.refs.attributes(variable)?,
        ))
    }

    /// Materialize a `(time, y, x)` or `(y, x)` variable.
    ///
    /// `window` selects rows and columns; it is clamped to the grid and
    /// must overlap it. All time steps are read.
    #[instrument(skip(self, window), fields(id = %self.id))]
    pub async fn read_grid(
        &self,
        variable: &str,
        window: Option<&BoundingBox>,
    ) -> Result<GridDataset> {
        let opened = self.open(variable).await?;
        let shape = opened.shape();
        let dims = self.dimension_names(variable, shape.len())?;
        let (times, height, width) = match shape.as_slice() {
            [h, w] => (1, *h, *w),
            [t, h, w] => (*t, *h, *w),
            other => {
                return Err(ForecastError::invalid_configuration(format!(
                    "{} must be (y, x) or (time, y, x), has shape {:?}",
                    variable, other
                )))
            }
        };

        let bbox = match window {
            Some(bbox) => bbox.clamp_to(height, width).ok_or_else(|| {
                ForecastError::invalid_bbox(format!(
                    "{} lies outside the {}x{} grid",
                    bbox, height, width
                ))
            })?,
            None => BoundingBox::new(0, height, 0, width)?,
        };

        let mut ranges = Vec::with_capacity(3);
        if shape.len() == 3 {
            if times == 0 {
                return Err(ForecastError::load_failure(&self.id, format!("{} has no time steps", variable)));
            }
            ranges.push(0..times);
        }
        ranges.push(bbox.row_min..bbox.row_max);
        ranges.push(bbox.col_min..bbox.col_max);

        let raw = self.read_window(&opened, variable, &ranges).await?;
        let cf = self.cf_decoding(variable)?;
        let data: Vec<f32> = raw.into_iter().map(|v| cf.apply(v) as f32).collect();

        let y_name = &dims[dims.len() - 2];
        let x_name = &dims[dims.len() - 1];
        let y = self.read_coordinate(y_name).await?;
        let x = self.read_coordinate(x_name).await?;
        if y.len() != height || x.len() != width {
            return Err(ForecastError::load_failure(
                &self.id,
                format!(
                    "coordinates {}={} {}={} do not match {} {}x{}",
                    y_name,
                    y.len(),
                    x_name,
                    x.len(),
                    variable,
                    height,
                    width
                ),
            ));
        }

        let crs = match self.projection(variable) {
            Ok(wkt) => Some(wkt),
            Err(ForecastError::MissingProjection(_)) => None,
            Err(e) => return Err(e),
        };

        GridDataset::new(
            variable,
            data,
            (times, bbox.rows(), bbox.cols()),
            x[bbox.col_min..bbox.col_max].to_vec(),
            y[bbox.row_min..bbox.row_max].to_vec(),
            crs,
        )
    }
}

/// Retrieve a subset in the array's own element type, widened to `f64`.
macro_rules! retrieve {
    ($array:expr, $subset:expr, $ty:ty) => {
        $array
            .async_retrieve_array_subset_elements::<$ty>($subset)
            .await
            .map(|values| values.into_iter().map(|v| v as f64).collect::<Vec<f64>>())
    };
}

async fn retrieve_as_f64(
    array: &Array<ReferenceStore>,
    subset: &ArraySubset,
) -> std::result::Result<Vec<f64>, String> {
    let values: std::result::Result<Vec<f64>, ArrayError> = match array.data_type() {
        DataType::Float32 => retrieve!(array, subset, f32),
        DataType::Float64 => retrieve!(array, subset, f64),
        DataType::Int8 => retrieve!(array, subset, i8),
        DataType::Int16 => retrieve!(array, subset, i16),
        DataType::Int32 => retrieve!(array, subset, i32),
        DataType::Int64 => retrieve!(array, subset, i64),
        DataType::UInt8 => retrieve!(array, subset, u8),
        DataType::UInt16 => retrieve!(array, subset, u16),
        DataType::UInt32 => retrieve!(array, subset, u32),
        DataType::UInt64 => retrieve!(array, subset, u64),
        other => return Err(format!("unsupported data type {:?}", other)),
    };
    values.map_err(|e| e.to_string())
}

impl std::fmt::Debug for ReferenceDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceDataset")
            .field("id", &self.id)
            .field("references", &self.refs.len())
            .finish()
    }
}

/// CF packing and missing-value attributes of one variable.
#[derive(Debug, Clone, Default)]
struct CfDecoding {
    missing: Vec<f64>,
    scale_factor: Option<f64>,
    add_offset: Option<f64>,
}

impl CfDecoding {
    fn from_attributes(fill_value: Option<f64>, attrs: &Map<String, Value>) -> Self {
        let mut missing: Vec<f64> = fill_value.into_iter().collect();
        for key in ["_FillValue", "missing_value"] {
            match attrs.get(key) {
                Some(Value::Array(values)) => missing.extend(values.iter().filter_map(number)),
                Some(v) => missing.extend(number(v)),
                None => {}
            }
        }
        Self {
            missing,
            scale_factor: attrs.get("scale_factor").and_then(number),
            add_offset: attrs.get("add_offset").and_then(number),
        }
    }

    fn apply(&self, raw: f64) -> f64 {
        if raw.is_nan() || self.missing.iter().any(|&m| m == raw) {
            return f64::NAN;
        }
        let mut v = raw;
        if let Some(scale) = self.scale_factor {
            v *= scale;
        }
        if let Some(offset) = self.add_offset {
            v += offset;
        }
        v
    }
}
