//! Error types for grid processing.
//!
//! Pipeline operations report the shared [`ForecastError`] taxonomy.
//! Failures inside zarrs are folded into `LoadFailure` unless the store
//! kept the fetch error that caused them.

pub use nwm_common::ForecastError;

/// Result type for grid processor operations.
pub type Result<T> = std::result::Result<T, ForecastError>;
