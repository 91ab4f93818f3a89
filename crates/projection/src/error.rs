//! Projection errors.

use nwm_common::ForecastError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("malformed WKT at byte {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unsupported projection: {0}")]
    Unsupported(String),

    #[error("missing projection parameter: {0}")]
    MissingParameter(String),

    #[error("invalid projection parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },
}

impl From<ProjectionError> for ForecastError {
    fn from(err: ProjectionError) -> Self {
        ForecastError::Projection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
