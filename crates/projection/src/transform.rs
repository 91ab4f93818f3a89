//! Source CRS to EPSG:4326 coordinate transformation.
//!
//! Axis order is always (x, y) on the projected side and (lon, lat) on the
//! geographic side. The source datum is taken as coincident with WGS84;
//! the NWM sphere carries no datum shift, so none is applied.

use tracing::debug;

use crate::error::Result;
use crate::lambert::LambertConformal;
use crate::wkt::CrsDefinition;

/// A 2-D coordinate pair.
pub type Point = [f64; 2];

#[derive(Debug, Clone)]
enum Kind {
    Identity,
    Lambert {
        projection: LambertConformal,
        /// Metres per source unit
        linear_unit: f64,
    },
}

/// Transformer from a source CRS to geographic lon/lat.
///
/// Build it once per dataset and reuse it for every point.
#[derive(Debug, Clone)]
pub struct Transformer {
    kind: Kind,
}

impl Transformer {
    /// Geographic source; coordinates pass through unchanged.
    pub fn identity() -> Self {
        Self { kind: Kind::Identity }
    }

    /// Build from a CRS string (ESRI/OGC WKT or `EPSG:4326`).
    pub fn from_crs(crs: &str) -> Result<Self> {
        Self::from_definition(&CrsDefinition::parse(crs)?)
    }

    pub fn from_definition(definition: &CrsDefinition) -> Result<Self> {
        let kind = match definition {
            CrsDefinition::Geographic { .. } => Kind::Identity,
            CrsDefinition::LambertConformal { params, linear_unit } => {
                debug!(
                    central_meridian = params.central_meridian,
                    standard_parallel_1 = params.standard_parallel_1,
                    standard_parallel_2 = params.standard_parallel_2,
                    "Built Lambert Conformal transformer"
                );
                Kind::Lambert {
                    projection: LambertConformal::new(*params)?,
                    linear_unit: *linear_unit,
                }
            }
        };
        Ok(Self { kind })
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.kind, Kind::Identity)
    }

    /// Source (x, y) to (lon, lat).
    pub fn to_geographic(&self, x: f64, y: f64) -> Point {
        match &self.kind {
            Kind::Identity => [x, y],
            Kind::Lambert {
                projection,
                linear_unit,
            } => {
                let (lon, lat) = projection.unproject(x * linear_unit, y * linear_unit);
                [lon, lat]
            }
        }
    }

    /// (lon, lat) back to source (x, y).
    pub fn from_geographic(&self, lon: f64, lat: f64) -> Point {
        match &self.kind {
            Kind::Identity => [lon, lat],
            Kind::Lambert {
                projection,
                linear_unit,
            } => {
                let (x, y) = projection.project(lon, lat);
                [x / linear_unit, y / linear_unit]
            }
        }
    }

    /// Transform a list of points to (lon, lat).
    pub fn points_to_geographic(&self, points: &[Point]) -> Vec<Point> {
        points.iter().map(|p| self.to_geographic(p[0], p[1])).collect()
    }

    /// Transform a list of point lists, keeping the nesting.
    pub fn rings_to_geographic(&self, rings: &[Vec<Point>]) -> Vec<Vec<Point>> {
        rings.iter().map(|r| self.points_to_geographic(r)).collect()
    }

    /// Transform a list of (lon, lat) points back to source coordinates.
    pub fn points_from_geographic(&self, points: &[Point]) -> Vec<Point> {
        points.iter().map(|p| self.from_geographic(p[0], p[1])).collect()
    }
}
