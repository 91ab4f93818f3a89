//! Core types for grid processing.

use projection::Transformer;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use nwm_common::ScaleFactor;

/// An in-memory `time × y × x` grid of one variable.
///
/// Values are stored row-major: index = `(t * height + row) * width + col`.
/// `x` holds one coordinate per column and `y` one per row, both in
/// source projection units.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDataset {
    variable: String,
    data: Vec<f32>,
    times: usize,
    height: usize,
    width: usize,
    x: Vec<f64>,
    y: Vec<f64>,
    crs: Option<String>,
}

impl GridDataset {
    /// Create a grid, checking that the data and coordinates agree with
    /// the `(times, height, width)` shape.
    pub fn new(
        variable: impl Into<String>,
        data: Vec<f32>,
        shape: (usize, usize, usize),
        x: Vec<f64>,
        y: Vec<f64>,
        crs: Option<String>,
    ) -> Result<Self> {
        let (times, height, width) = shape;
        if data.len() != times * height * width {
            return Err(ForecastError::invalid_configuration(format!(
                "grid data has {} values, shape {}x{}x{} needs {}",
                data.len(),
                times,
                height,
                width,
                times * height * width
            )));
        }
        if x.len() != width || y.len() != height {
            return Err(ForecastError::invalid_configuration(format!(
                "coordinate lengths x={} y={} do not match grid {}x{}",
                x.len(),
                y.len(),
                width,
                height
            )));
        }
        Ok(Self {
            variable: variable.into(),
            data,
            times,
            height,
            width,
            x,
            y,
            crs,
        })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// `(times, height, width)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.times, self.height, self.width)
    }

    pub fn times(&self) -> usize {
        self.times
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Source projection descriptor (WKT), when known.
    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    pub fn with_crs(mut self, crs: Option<String>) -> Self {
        self.crs = crs;
        self
    }

    #[inline]
    pub fn index(&self, t: usize, row: usize, col: usize) -> usize {
        (t * self.height + row) * self.width + col
    }

    /// Value at (t, row, col), or None when out of range.
    pub fn get(&self, t: usize, row: usize, col: usize) -> Option<f32> {
        if t >= self.times || row >= self.height || col >= self.width {
            return None;
        }
        self.data.get(self.index(t, row, col)).copied()
    }

    /// All values of one time step.
    pub fn time_slice(&self, t: usize) -> &[f32] {
        let plane = self.height * self.width;
        let start = (t * plane).min(self.data.len());
        let end = ((t + 1) * plane).min(self.data.len());
        &self.data[start..end]
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A processed precipitation grid together with the transformer for
/// its projection.
#[derive(Debug, Clone)]
pub struct PrecipField {
    pub grid: GridDataset,
    pub transformer: Transformer,
    /// Block size applied when the grid was downsampled.
    pub scale: ScaleFactor,
}

/// Statistics about a cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridDataset {
        GridDataset::new(
            "RAINRATE",
            (0..24).map(|v| v as f32).collect(),
            (2, 3, 4),
            vec![0.0, 1.0, 2.0, 3.0],
            vec![10.0, 11.0, 12.0],
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_indexing() {
        let g = grid();
        assert_eq!(g.get(0, 0, 0), Some(0.0));
        assert_eq!(g.get(0, 2, 3), Some(11.0));
        assert_eq!(g.get(1, 0, 1), Some(13.0));
        assert_eq!(g.get(2, 0, 0), None);
        assert_eq!(g.time_slice(1).len(), 12);
        assert_eq!(g.time_slice(1)[0], 12.0);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = GridDataset::new("v", vec![0.0; 5], (1, 2, 3), vec![0.0; 3], vec![0.0; 2], None);
        assert!(err.is_err());
        let err = GridDataset::new("v", vec![0.0; 6], (1, 2, 3), vec![0.0; 2], vec![0.0; 2], None);
        assert!(err.is_err());
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            entries: 2,
            evictions: 0,
        };
        assert!((stats.hit_rate() - 0.75).abs() < 1e-12);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
