//! HTTP request handlers for the forcing API.

pub mod files;
pub mod forecast;
pub mod grid;
pub mod health;
pub mod session;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use grid_processor::ForecastError;
use serde::{de::DeserializeOwned, Serialize};

/// Serialize `body` as a JSON response.
pub(crate) fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(json) => (status, [(header::CONTENT_TYPE, "application/json")], json).into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Failed to serialize response: {}", e),
        ),
    }
}

/// `{"error": message}` with the given status.
pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({ "error": message }).to_string();
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Map a pipeline error to its HTTP status and log it.
pub(crate) fn forecast_error_response(err: &ForecastError) -> Response {
    let status = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if err.is_client_error() {
        tracing::warn!(error = %err, status = status.as_u16(), "Request rejected");
    } else {
        tracing::error!(error = %err, status = status.as_u16(), "Request failed");
    }
    error_response(status, &err.to_string())
}

/// `{"message": message}` with 200.
pub(crate) fn message_response(message: &str) -> Response {
    json_response(StatusCode::OK, &serde_json::json!({ "message": message }))
}

/// Parse a JSON request body. An empty body is treated as `{}`.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ForecastError> {
    let slice: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };
    serde_json::from_slice(slice)
        .map_err(|e| ForecastError::InvalidRequest(format!("invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Body {
        #[serde(default)]
        a: Option<u32>,
    }

    #[test]
    fn test_parse_body() {
        let parsed: Body = parse_body(&Bytes::from_static(b"")).unwrap();
        assert_eq!(parsed.a, None);
        let parsed: Body = parse_body(&Bytes::from_static(b"{\"a\": 3}")).unwrap();
        assert_eq!(parsed.a, Some(3));

        let err = parse_body::<Body>(&Bytes::from_static(b"{not json")).unwrap_err();
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_error_status_mapping() {
        let response = forecast_error_response(&ForecastError::Timeout("x".into()));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let response = forecast_error_response(&ForecastError::InvalidRequest("x".into()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
