//! Error types shared by the forcing pipeline crates.

use thiserror::Error;

/// Result type alias using ForecastError.
pub type ForecastResult<T> = Result<T, ForecastError>;

/// Primary error type for the forcing pipeline.
#[derive(Debug, Error)]
pub enum ForecastError {
    // === Request Errors ===
    #[error("Invalid forecast configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Invalid scale factor: {0}")]
    InvalidScale(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Data Errors ===
    #[error("Variable not found in dataset: {0}")]
    MissingVariable(String),

    #[error("Projection attribute not found: {0}")]
    MissingProjection(String),

    #[error("Projection error: {0}")]
    Projection(String),

    // === Infrastructure Errors ===
    #[error("Failed to load {url}: {message}")]
    LoadFailure { url: String, message: String },

    #[error("Timed out loading {0}")]
    Timeout(String),
}

impl ForecastError {
    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create an InvalidBoundingBox error.
    pub fn invalid_bbox(msg: impl Into<String>) -> Self {
        Self::InvalidBoundingBox(msg.into())
    }

    /// Create a LoadFailure error for a resource.
    pub fn load_failure(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LoadFailure {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether the caller sent something the pipeline can never satisfy.
    pub fn is_client_error(&self) -> bool {
        self.http_status_code() < 500
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            ForecastError::InvalidConfiguration(_)
            | ForecastError::InvalidBoundingBox(_)
            | ForecastError::InvalidScale(_)
            | ForecastError::InvalidDate(_)
            | ForecastError::InvalidRequest(_) => 400,

            ForecastError::LoadFailure { .. } => 502,
            ForecastError::Timeout(_) => 504,

            ForecastError::MissingVariable(_)
            | ForecastError::MissingProjection(_)
            | ForecastError::Projection(_) => 500,
        }
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::load_failure("<json>", format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ForecastError::invalid_configuration("x").http_status_code(), 400);
        assert_eq!(ForecastError::invalid_bbox("x").http_status_code(), 400);
        assert_eq!(ForecastError::load_failure("u", "m").http_status_code(), 502);
        assert_eq!(ForecastError::Timeout("u".into()).http_status_code(), 504);
        assert_eq!(ForecastError::MissingProjection("RAINRATE".into()).http_status_code(), 500);
    }

    #[test]
    fn test_load_failure_message_names_url() {
        let err = ForecastError::load_failure("https://host/a.json", "404");
        assert_eq!(err.to_string(), "Failed to load https://host/a.json: 404");
        assert!(!err.is_client_error());
    }
}
