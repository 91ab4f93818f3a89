//! Lambert Conformal Conic projection.
//!
//! This projection is used by the National Water Model grids (CONUS,
//! Hawaii and Puerto Rico). It maps a cone secant to the Earth's surface
//! onto a flat plane, with coordinates in projected metres.
//!
//! The formulas follow the ellipsoidal form (Snyder, "Map Projections: A
//! Working Manual", eqs. 15-1 to 15-11). A sphere is the special case
//! with zero eccentricity, where the inverse needs no iteration.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use crate::error::{ProjectionError, Result};

/// Radius of the sphere the NWM grids are defined on.
pub const NWM_SPHERE_RADIUS: f64 = 6_370_000.0;

/// Reference ellipsoid (or sphere when `inverse_flattening` is zero).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    /// Semi-major axis in metres.
    pub semi_major: f64,
    /// Inverse flattening; 0 means a sphere.
    pub inverse_flattening: f64,
}

impl Ellipsoid {
    pub fn sphere(radius: f64) -> Self {
        Self {
            semi_major: radius,
            inverse_flattening: 0.0,
        }
    }

    pub fn wgs84() -> Self {
        Self {
            semi_major: 6_378_137.0,
            inverse_flattening: 298.257_223_563,
        }
    }

    /// First eccentricity.
    pub fn eccentricity(&self) -> f64 {
        if self.inverse_flattening == 0.0 {
            return 0.0;
        }
        let f = 1.0 / self.inverse_flattening;
        (2.0 * f - f * f).sqrt()
    }
}

/// Defining parameters, angles in degrees and offsets in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LambertParams {
    pub standard_parallel_1: f64,
    pub standard_parallel_2: f64,
    pub latitude_of_origin: f64,
    pub central_meridian: f64,
    pub false_easting: f64,
    pub false_northing: f64,
    pub scale_factor: f64,
    pub ellipsoid: Ellipsoid,
}

impl LambertParams {
    /// Parameters of the NWM CONUS grid.
    pub fn nwm_conus() -> Self {
        Self {
            standard_parallel_1: 30.0,
            standard_parallel_2: 60.0,
            latitude_of_origin: 40.0,
            central_meridian: -97.0,
            false_easting: 0.0,
            false_northing: 0.0,
            scale_factor: 1.0,
            ellipsoid: Ellipsoid::sphere(NWM_SPHERE_RADIUS),
        }
    }
}

/// Prepared Lambert Conformal Conic projection.
#[derive(Debug, Clone)]
pub struct LambertConformal {
    params: LambertParams,
    /// Central meridian in radians
    lon0: f64,
    /// Eccentricity
    e: f64,
    /// Cone constant
    n: f64,
    /// a * k0 * F
    a_f: f64,
    /// Rho at the latitude of origin
    rho0: f64,
}

impl LambertConformal {
    pub fn new(params: LambertParams) -> Result<Self> {
        let lat1 = params.standard_parallel_1.to_radians();
        let lat2 = params.standard_parallel_2.to_radians();
        let lat0 = params.latitude_of_origin.to_radians();

        for (name, value) in [
            ("standard_parallel_1", params.standard_parallel_1),
            ("standard_parallel_2", params.standard_parallel_2),
            ("latitude_of_origin", params.latitude_of_origin),
        ] {
            if !value.is_finite() || value.abs() >= 90.0 {
                return Err(ProjectionError::InvalidParameter {
                    name: name.to_string(),
                    message: format!("{} is not a usable latitude", value),
                });
            }
        }
        if params.ellipsoid.semi_major <= 0.0 {
            return Err(ProjectionError::InvalidParameter {
                name: "semi_major".to_string(),
                message: format!("{} must be positive", params.ellipsoid.semi_major),
            });
        }
        if params.scale_factor <= 0.0 {
            return Err(ProjectionError::InvalidParameter {
                name: "scale_factor".to_string(),
                message: format!("{} must be positive", params.scale_factor),
            });
        }

        let e = params.ellipsoid.eccentricity();
        let m1 = msfn(e, lat1);
        let t1 = tsfn(e, lat1);

        // Tangent cone when both parallels coincide
        let n = if (lat1 - lat2).abs() < 1e-10 {
            lat1.sin()
        } else {
            let m2 = msfn(e, lat2);
            let t2 = tsfn(e, lat2);
            (m1.ln() - m2.ln()) / (t1.ln() - t2.ln())
        };
        if n == 0.0 || !n.is_finite() {
            return Err(ProjectionError::InvalidParameter {
                name: "standard_parallel_1".to_string(),
                message: "standard parallels are symmetric about the equator".to_string(),
            });
        }

        let f = m1 / (n * t1.powf(n));
        let a_f = params.ellipsoid.semi_major * params.scale_factor * f;
        let rho0 = a_f * tsfn(e, lat0).powf(n);

        Ok(Self {
            params,
            lon0: params.central_meridian.to_radians(),
            e,
            n,
            a_f,
            rho0,
        })
    }

    pub fn params(&self) -> &LambertParams {
        &self.params
    }

    /// Cone constant.
    pub fn cone_constant(&self) -> f64 {
        self.n
    }

    /// Geographic (lon, lat in degrees) to projected (x, y in metres).
    pub fn project(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let mut dlon = lon_deg.to_radians() - self.lon0;
        while dlon > PI {
            dlon -= 2.0 * PI;
        }
        while dlon < -PI {
            dlon += 2.0 * PI;
        }

        let rho = if (lat.abs() - FRAC_PI_2).abs() < 1e-12 {
            if lat * self.n > 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            self.a_f * tsfn(self.e, lat).powf(self.n)
        };

        let theta = self.n * dlon;
        let x = rho * theta.sin() + self.params.false_easting;
        let y = self.rho0 - rho * theta.cos() + self.params.false_northing;
        (x, y)
    }

    /// Projected (x, y in metres) to geographic (lon, lat in degrees).
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.params.false_easting;
        let dy = self.rho0 - (y - self.params.false_northing);
        let sign = self.n.signum();

        let rho = sign * (dx * dx + dy * dy).sqrt();
        if rho == 0.0 {
            return (self.params.central_meridian, sign * 90.0);
        }

        let theta = (sign * dx).atan2(sign * dy);
        let t = (rho / self.a_f).powf(1.0 / self.n);
        let lat = phi_from_t(self.e, t);
        let lon = theta / self.n + self.lon0;

        (lon.to_degrees(), lat.to_degrees())
    }
}

/// m(φ) = cos φ / sqrt(1 - e² sin² φ)
fn msfn(e: f64, phi: f64) -> f64 {
    let s = e * phi.sin();
    phi.cos() / (1.0 - s * s).sqrt()
}

/// t(φ) = tan(π/4 - φ/2) / ((1 - e sin φ) / (1 + e sin φ))^(e/2)
fn tsfn(e: f64, phi: f64) -> f64 {
    let s = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - s) / (1.0 + s)).powf(e / 2.0)
}

/// Invert `tsfn`. Closed form on a sphere, fixed-point iteration otherwise.
fn phi_from_t(e: f64, t: f64) -> f64 {
    let mut phi = FRAC_PI_2 - 2.0 * t.atan();
    if e == 0.0 {
        return phi;
    }
    for _ in 0..16 {
        let s = e * phi.sin();
        let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - s) / (1.0 + s)).powf(e / 2.0)).atan();
        if (next - phi).abs() < 1e-14 {
            return next;
        }
        phi = next;
    }
    phi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nwm() -> LambertConformal {
        LambertConformal::new(LambertParams::nwm_conus()).unwrap()
    }

    #[test]
    fn test_origin_maps_to_zero() {
        let (x, y) = nwm().project(-97.0, 40.0);
        assert!(x.abs() < 1e-6, "x should be 0, got {}", x);
        assert!(y.abs() < 1e-6, "y should be 0, got {}", y);
    }

    #[test]
    fn test_known_forward_point() {
        let (x, y) = nwm().project(-100.0, 35.0);
        assert!((x - -268_159.5436).abs() < 0.01, "x = {}", x);
        assert!((y - -537_209.0024).abs() < 0.01, "y = {}", y);
    }

    #[test]
    fn test_nwm_grid_corners() {
        let proj = nwm();
        let (lon, lat) = proj.unproject(-2_303_999.25, -1_919_999.625);
        assert!((lon - -118.1077).abs() < 1e-3, "lon = {}", lon);
        assert!((lat - 20.0726).abs() < 1e-3, "lat = {}", lat);

        let (lon, lat) = proj.unproject(2_303_999.25, 1_919_999.625);
        assert!((lon - -60.4824).abs() < 1e-3, "lon = {}", lon);
        assert!((lat - 52.8749).abs() < 1e-3, "lat = {}", lat);
    }

    #[test]
    fn test_sphere_roundtrip() {
        let proj = nwm();
        for &(x, y) in &[(0.0, 0.0), (1500.0, -2500.0), (-2_000_000.0, 1_500_000.0)] {
            let (lon, lat) = proj.unproject(x, y);
            let (x2, y2) = proj.project(lon, lat);
            assert!((x - x2).abs() < 1e-6, "x roundtrip {} vs {}", x, x2);
            assert!((y - y2).abs() < 1e-6, "y roundtrip {} vs {}", y, y2);
        }
    }

    #[test]
    fn test_ellipsoid_roundtrip_with_false_origin() {
        let params = LambertParams {
            standard_parallel_1: 33.0,
            standard_parallel_2: 45.0,
            latitude_of_origin: 23.0,
            central_meridian: -96.0,
            false_easting: 500_000.0,
            false_northing: 250_000.0,
            scale_factor: 1.0,
            ellipsoid: Ellipsoid::wgs84(),
        };
        let proj = LambertConformal::new(params).unwrap();
        let (x, y) = proj.project(-90.5, 41.25);
        let (lon, lat) = proj.unproject(x, y);
        assert!((lon - -90.5).abs() < 1e-9);
        assert!((lat - 41.25).abs() < 1e-9);
    }

    #[test]
    fn test_tangent_cone() {
        let mut params = LambertParams::nwm_conus();
        params.standard_parallel_2 = params.standard_parallel_1;
        let proj = LambertConformal::new(params).unwrap();
        assert!((proj.cone_constant() - 30f64.to_radians().sin()).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_polar_parallel() {
        let mut params = LambertParams::nwm_conus();
        params.standard_parallel_1 = 90.0;
        assert!(LambertConformal::new(params).is_err());
    }
}
