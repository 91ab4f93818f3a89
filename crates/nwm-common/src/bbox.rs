//! Index-space bounding boxes and scale factors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ForecastError, ForecastResult};

/// A row/column window into a grid, half-open on the max side.
///
/// Rows index the `y` dimension and columns the `x` dimension, both in
/// full-resolution (pre-downsampling) units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

impl BoundingBox {
    /// Create a validated bounding box.
    pub fn new(row_min: usize, row_max: usize, col_min: usize, col_max: usize) -> ForecastResult<Self> {
        if row_min >= row_max {
            return Err(ForecastError::invalid_bbox(format!(
                "rowMin ({}) must be less than rowMax ({})",
                row_min, row_max
            )));
        }
        if col_min >= col_max {
            return Err(ForecastError::invalid_bbox(format!(
                "colMin ({}) must be less than colMax ({})",
                col_min, col_max
            )));
        }
        Ok(Self {
            row_min,
            row_max,
            col_min,
            col_max,
        })
    }

    /// Build from the four optional request fields.
    ///
    /// All four absent means "no clipping". All four present yields a
    /// validated box. Anything in between is rejected.
    pub fn from_optional(
        row_min: Option<usize>,
        row_max: Option<usize>,
        col_min: Option<usize>,
        col_max: Option<usize>,
    ) -> ForecastResult<Option<Self>> {
        match (row_min, row_max, col_min, col_max) {
            (None, None, None, None) => Ok(None),
            (Some(r0), Some(r1), Some(c0), Some(c1)) => Self::new(r0, r1, c0, c1).map(Some),
            _ => Err(ForecastError::invalid_bbox(
                "rowMin, rowMax, colMin and colMax must be given together",
            )),
        }
    }

    pub fn rows(&self) -> usize {
        self.row_max - self.row_min
    }

    pub fn cols(&self) -> usize {
        self.col_max - self.col_min
    }

    /// Clamp to a grid of `height` rows and `width` columns.
    ///
    /// Returns None when nothing of the box remains inside the grid.
    pub fn clamp_to(&self, height: usize, width: usize) -> Option<Self> {
        let row_max = self.row_max.min(height);
        let col_max = self.col_max.min(width);
        if self.row_min >= row_max || self.col_min >= col_max {
            return None;
        }
        Some(Self {
            row_min: self.row_min,
            row_max,
            col_min: self.col_min,
            col_max,
        })
    }

    /// Express this box in the index space of a grid already downsampled
    /// by `scale`.
    ///
    /// Clipping is always applied before downsampling, so this is only
    /// useful for comparing against the other order.
    pub fn scaled_down(&self, scale: ScaleFactor) -> Self {
        Self {
            row_min: self.row_min / scale.y,
            row_max: self.row_max / scale.y,
            col_min: self.col_min / scale.x,
            col_max: self.col_max / scale.x,
        }
    }

    /// Generate a cache key fragment for this box.
    pub fn cache_key(&self) -> String {
        format!(
            "r{}-{}_c{}-{}",
            self.row_min, self.row_max, self.col_min, self.col_max
        )
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows [{}, {}) cols [{}, {})",
            self.row_min, self.row_max, self.col_min, self.col_max
        )
    }
}

/// Integer block size used when downsampling a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScaleFactor {
    pub x: usize,
    pub y: usize,
}

impl ScaleFactor {
    /// Default scale used by map requests.
    pub const DEFAULT: ScaleFactor = ScaleFactor { x: 16, y: 16 };

    /// Identity scale (no downsampling).
    pub const ONE: ScaleFactor = ScaleFactor { x: 1, y: 1 };

    pub fn new(x: usize, y: usize) -> ForecastResult<Self> {
        if x == 0 || y == 0 {
            return Err(ForecastError::InvalidScale(format!(
                "scale factors must be >= 1, got {}x{}",
                x, y
            )));
        }
        Ok(Self { x, y })
    }

    pub fn is_identity(&self) -> bool {
        self.x == 1 && self.y == 1
    }
}

impl Default for ScaleFactor {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_inverted_bounds() {
        assert!(BoundingBox::new(10, 10, 0, 5).is_err());
        assert!(BoundingBox::new(0, 5, 7, 3).is_err());
        assert!(BoundingBox::new(0, 5, 0, 5).is_ok());
    }

    #[test]
    fn test_from_optional_all_or_nothing() {
        assert_eq!(BoundingBox::from_optional(None, None, None, None).unwrap(), None);

        let bbox = BoundingBox::from_optional(Some(1), Some(4), Some(2), Some(8))
            .unwrap()
            .unwrap();
        assert_eq!(bbox.rows(), 3);
        assert_eq!(bbox.cols(), 6);

        let err = BoundingBox::from_optional(Some(1), None, Some(2), Some(8)).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidBoundingBox(_)));
    }

    #[test]
    fn test_clamp_to_grid() {
        let bbox = BoundingBox::new(2, 100, 0, 10).unwrap();
        let clamped = bbox.clamp_to(20, 5).unwrap();
        assert_eq!(clamped, BoundingBox::new(2, 20, 0, 5).unwrap());

        let outside = BoundingBox::new(30, 40, 0, 5).unwrap();
        assert!(outside.clamp_to(20, 5).is_none());
    }

    #[test]
    fn test_scale_factor_validation() {
        assert!(ScaleFactor::new(0, 4).is_err());
        assert_eq!(ScaleFactor::default(), ScaleFactor { x: 16, y: 16 });
        assert!(ScaleFactor::ONE.is_identity());
    }
}
