//! Spatial transforms on in-memory grids.
//!
//! Clipping always happens before downsampling, so a bounding box is
//! interpreted in full-resolution index space. `BoundingBox::scaled_down`
//! exists for comparing the two orders; nothing in the pipeline uses it.

use nwm_common::{BoundingBox, ScaleFactor};

use crate::error::{ForecastError, Result};
use crate::types::GridDataset;

/// Select rows `[row_min, row_max)` and columns `[col_min, col_max)`.
///
/// The box is clamped to the grid; a box that misses the grid entirely
/// is rejected.
pub fn clip(grid: &GridDataset, bbox: &BoundingBox) -> Result<GridDataset> {
    let (times, height, width) = grid.shape();
    let window = bbox.clamp_to(height, width).ok_or_else(|| {
        ForecastError::invalid_bbox(format!(
            "{} lies outside the {}x{} grid",
            bbox, height, width
        ))
    })?;

    let rows = window.rows();
    let cols = window.cols();
    let mut data = Vec::with_capacity(times * rows * cols);
    for t in 0..times {
        for row in window.row_min..window.row_max {
            let start = grid.index(t, row, window.col_min);
            data.extend_from_slice(&grid.data()[start..start + cols]);
        }
    }

    GridDataset::new(
        grid.variable(),
        data,
        (times, rows, cols),
        grid.x()[window.col_min..window.col_max].to_vec(),
        grid.y()[window.row_min..window.row_max].to_vec(),
        grid.crs().map(str::to_string),
    )
}

/// Block-mean downsample with the trim boundary policy.
///
/// Trailing rows and columns that do not fill a whole block are dropped.
/// A NaN anywhere in a block makes that block NaN. Output coordinates are
/// the mean of each block's coordinates.
pub fn downsample(grid: &GridDataset, scale: ScaleFactor) -> Result<GridDataset> {
    if scale.x == 0 || scale.y == 0 {
        return Err(ForecastError::InvalidScale(format!("{}", scale)));
    }
    if scale.is_identity() {
        return Ok(grid.clone());
    }

    let (times, height, width) = grid.shape();
    let out_h = height / scale.y;
    let out_w = width / scale.x;
    if out_h == 0 || out_w == 0 {
        return Err(ForecastError::InvalidScale(format!(
            "scale {} leaves nothing of a {}x{} grid",
            scale, height, width
        )));
    }

    let block = (scale.x * scale.y) as f64;
    let mut data = Vec::with_capacity(times * out_h * out_w);
    for t in 0..times {
        for out_y in 0..out_h {
            for out_x in 0..out_w {
                let mut sum = 0.0f64;
                for dy in 0..scale.y {
                    let row = out_y * scale.y + dy;
                    let start = grid.index(t, row, out_x * scale.x);
                    for &v in &grid.data()[start..start + scale.x] {
                        sum += v as f64;
                    }
                }
                data.push((sum / block) as f32);
            }
        }
    }

    GridDataset::new(
        grid.variable(),
        data,
        (times, out_h, out_w),
        block_means(grid.x(), scale.x, out_w),
        block_means(grid.y(), scale.y, out_h),
        grid.crs().map(str::to_string),
    )
}

fn block_means(coords: &[f64], size: usize, blocks: usize) -> Vec<f64> {
    (0..blocks)
        .map(|b| coords[b * size..(b + 1) * size].iter().sum::<f64>() / size as f64)
        .collect()
}

/// Clip (when a box is given), then downsample (when a scale is given).
pub fn clip_then_downsample(
    grid: &GridDataset,
    bbox: Option<&BoundingBox>,
    scale: Option<ScaleFactor>,
) -> Result<GridDataset> {
    let clipped = match bbox {
        Some(bbox) => clip(grid, bbox)?,
        None => grid.clone(),
    };
    match scale {
        Some(scale) => downsample(&clipped, scale),
        None => Ok(clipped),
    }
}

/// Concatenate grids along time.
///
/// Every grid must share the variable, coordinates and projection of the
/// first one.
pub fn merge_time(grids: &[GridDataset]) -> Result<GridDataset> {
    let first = grids
        .first()
        .ok_or_else(|| ForecastError::invalid_configuration("no grids to merge"))?;

    let mut times = 0;
    let mut data = Vec::new();
    for grid in grids {
        if grid.variable() != first.variable()
            || grid.x() != first.x()
            || grid.y() != first.y()
            || grid.crs() != first.crs()
        {
            return Err(ForecastError::invalid_configuration(format!(
                "cannot merge {} {:?} with {} {:?}: coordinates differ",
                first.variable(),
                first.shape(),
                grid.variable(),
                grid.shape()
            )));
        }
        times += grid.times();
        data.extend_from_slice(grid.data());
    }

    GridDataset::new(
        first.variable(),
        data,
        (times, first.height(), first.width()),
        first.x().to_vec(),
        first.y().to_vec(),
        first.crs().map(str::to_string),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1 × height × width grid with value = row * 100 + col.
    fn ramp(height: usize, width: usize) -> GridDataset {
        let data = (0..height)
            .flat_map(|r| (0..width).map(move |c| (r * 100 + c) as f32))
            .collect();
        GridDataset::new(
            "RAINRATE",
            data,
            (1, height, width),
            (0..width).map(|c| c as f64 * 1000.0).collect(),
            (0..height).map(|r| r as f64 * 1000.0).collect(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_clip_half_open() {
        let g = ramp(6, 8);
        let bbox = BoundingBox::new(1, 3, 2, 5).unwrap();
        let c = clip(&g, &bbox).unwrap();
        assert_eq!(c.shape(), (1, 2, 3));
        assert_eq!(c.data(), &[102.0, 103.0, 104.0, 202.0, 203.0, 204.0]);
        assert_eq!(c.x(), &[2000.0, 3000.0, 4000.0]);
        assert_eq!(c.y(), &[1000.0, 2000.0]);
    }

    #[test]
    fn test_clip_outside_grid() {
        let g = ramp(4, 4);
        let bbox = BoundingBox::new(10, 12, 0, 2).unwrap();
        assert!(matches!(
            clip(&g, &bbox),
            Err(ForecastError::InvalidBoundingBox(_))
        ));
    }

    #[test]
    fn test_downsample_trims_and_averages() {
        let g = ramp(5, 7);
        let d = downsample(&g, ScaleFactor::new(2, 2).unwrap()).unwrap();
        assert_eq!(d.shape(), (1, 2, 3));
        // Block rows 0-1, cols 0-1: (0 + 1 + 100 + 101) / 4
        assert_eq!(d.get(0, 0, 0), Some(50.5));
        assert_eq!(d.x(), &[500.0, 2500.0, 4500.0]);
        assert_eq!(d.y(), &[500.0, 2500.0]);
    }

    #[test]
    fn test_downsample_propagates_nan() {
        let mut data = vec![1.0f32; 16];
        data[5] = f32::NAN;
        let g = GridDataset::new(
            "RAINRATE",
            data,
            (1, 4, 4),
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0, 1.0, 2.0, 3.0],
            None,
        )
        .unwrap();
        let d = downsample(&g, ScaleFactor::new(2, 2).unwrap()).unwrap();
        assert!(d.get(0, 0, 0).unwrap().is_nan());
        assert_eq!(d.get(0, 0, 1), Some(1.0));
        assert_eq!(d.get(0, 1, 1), Some(1.0));
    }

    #[test]
    fn test_downsample_too_coarse() {
        let g = ramp(3, 3);
        assert!(matches!(
            downsample(&g, ScaleFactor::new(4, 1).unwrap()),
            Err(ForecastError::InvalidScale(_))
        ));
    }

    #[test]
    fn test_clip_then_scale_shape() {
        let g = ramp(40, 50);
        let bbox = BoundingBox::new(3, 38, 5, 47).unwrap();
        let scale = ScaleFactor::new(4, 8).unwrap();
        let out = clip_then_downsample(&g, Some(&bbox), Some(scale)).unwrap();
        let clipped = clip(&g, &bbox).unwrap();
        assert_eq!(
            out.shape(),
            (1, clipped.height() / scale.y, clipped.width() / scale.x)
        );
    }

    #[test]
    fn test_orders_are_not_equivalent() {
        // Downsample-then-clip with a rescaled box lands on different
        // blocks than the canonical clip-then-downsample.
        let g = ramp(40, 50);
        let bbox = BoundingBox::new(3, 38, 5, 47).unwrap();
        let scale = ScaleFactor::new(4, 8).unwrap();

        let canonical = clip_then_downsample(&g, Some(&bbox), Some(scale)).unwrap();
        let other = clip(&downsample(&g, scale).unwrap(), &bbox.scaled_down(scale)).unwrap();
        assert_ne!(canonical, other);
    }

    #[test]
    fn test_merge_time() {
        let a = ramp(2, 2);
        let b = ramp(2, 2);
        let merged = merge_time(&[a, b]).unwrap();
        assert_eq!(merged.shape(), (2, 2, 2));
        assert_eq!(merged.time_slice(1), &[0.0, 1.0, 100.0, 101.0]);

        assert!(merge_time(&[ramp(2, 2), ramp(2, 3)]).is_err());
        assert!(merge_time(&[]).is_err());
    }
}
