//! Common types and utilities shared across the forcing pipeline crates.

pub mod bbox;
pub mod error;
pub mod time;

pub use bbox::{BoundingBox, ScaleFactor};
pub use error::{ForecastError, ForecastResult};
pub use time::{date_range, days_between, folder_date, parse_forecast_date};
