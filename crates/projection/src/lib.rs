//! Coordinate reference system transformations.
//!
//! Implements map projections from scratch without external dependencies.
//! Only what NWM grids need is supported: Lambert Conformal Conic source
//! grids described by WKT, transformed to and from geographic lon/lat.

pub mod error;
pub mod lambert;
pub mod transform;
pub mod wkt;

pub use error::ProjectionError;
pub use lambert::{Ellipsoid, LambertConformal, LambertParams, NWM_SPHERE_RADIUS};
pub use transform::{Point, Transformer};
pub use wkt::{CrsDefinition, WktNode, WktValue};

/// `esri_pe_string` attribute published on the NWM CONUS grids.
pub const NWM_CONUS_PE_STRING: &str = "PROJCS[\"Lambert_Conformal_Conic\",GEOGCS[\"GCS_Sphere\",DATUM[\"D_Sphere\",SPHEROID[\"Sphere\",6370000.0,0.0]],PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]],PROJECTION[\"Lambert_Conformal_Conic\"],PARAMETER[\"false_easting\",0.0],PARAMETER[\"false_northing\",0.0],PARAMETER[\"central_meridian\",-97.0],PARAMETER[\"standard_parallel_1\",30.0],PARAMETER[\"standard_parallel_2\",60.0],PARAMETER[\"latitude_of_origin\",40.0],UNIT[\"Meter\",1.0]];-35691800 -29075200 126180232.640845;-100000 10000;-100000 10000;0.001;0.001;0.001;IsHighPrecision";
