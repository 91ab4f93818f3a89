//! File list handler: the URL builder over HTTP.

use axum::{http::StatusCode, response::Response};
use bytes::Bytes;
use grid_processor::ForecastError;
use nwm_urlgen::{EnsembleMember, ForecastRequest, Geography, RunType, UrlBase, Variable};
use serde::{Deserialize, Serialize};

use super::{forecast_error_response, json_response, parse_body};
use crate::params::{opt_bool, opt_string, opt_u32, opt_u32_list};

/// Body of `POST /file_list`. Taxonomy fields accept codes or names.
#[derive(Debug, Default, Deserialize)]
pub struct FileListRequest {
    #[serde(default, alias = "runtype", deserialize_with = "opt_string")]
    pub run: Option<String>,
    #[serde(default, alias = "varinput", deserialize_with = "opt_string")]
    pub variable: Option<String>,
    #[serde(default, alias = "geoinput", deserialize_with = "opt_string")]
    pub geography: Option<String>,
    #[serde(default, alias = "meminput", deserialize_with = "opt_string")]
    pub member: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub start_date: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub end_date: Option<String>,
    #[serde(default, alias = "fcst_cycle", deserialize_with = "opt_u32_list")]
    pub cycles: Option<Vec<u32>>,
    #[serde(default, alias = "lead_time", deserialize_with = "opt_u32_list")]
    pub lead_times: Option<Vec<u32>>,
    #[serde(default, alias = "urlbaseinput", deserialize_with = "opt_u32")]
    pub url_base: Option<u32>,
    #[serde(default, deserialize_with = "opt_bool")]
    pub append_json: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub count: usize,
    pub files: Vec<String>,
}

/// POST /file_list - Generate forecast file identifiers
pub async fn file_list_handler(body: Bytes) -> Response {
    metrics::counter!("forcing_api_requests_total", "endpoint" => "file_list").increment(1);
    let result = parse_body::<FileListRequest>(&body).and_then(build_request);
    match result {
        Ok(request) => {
            let files: Vec<String> = request
                .create_file_list()
                .into_iter()
                .map(|id| id.into_string())
                .collect();
            tracing::debug!(count = files.len(), "File list generated");
            json_response(
                StatusCode::OK,
                &FileListResponse {
                    count: files.len(),
                    files,
                },
            )
        }
        Err(e) => forecast_error_response(&e),
    }
}

/// Build a validated [`ForecastRequest`] from the body.
pub fn build_request(request: FileListRequest) -> Result<ForecastRequest, ForecastError> {
    let run: RunType = required(request.run, "run")?.parse()?;
    let variable: Variable = required(request.variable, "variable")?.parse()?;
    let geography: Geography = required(request.geography, "geography")?.parse()?;
    let member = request
        .member
        .map(|m| m.parse::<EnsembleMember>())
        .transpose()?;
    let start = required(request.start_date, "start_date")?;

    let mut builder = ForecastRequest::builder(run, variable, geography)
        .member(member)
        .date_range(&start, request.end_date.as_deref())?
        .append_json(request.append_json.unwrap_or(false));
    if let Some(cycles) = request.cycles {
        builder = builder.cycles(cycles);
    }
    if let Some(lead_times) = request.lead_times {
        builder = builder.lead_times(lead_times);
    }
    if let Some(index) = request.url_base {
        let index = u8::try_from(index).map_err(|_| {
            ForecastError::invalid_configuration(format!("unknown url base: {}", index))
        })?;
        builder = builder.url_base(UrlBase::from_index(index)?);
    }
    builder.build()
}

fn required(value: Option<String>, field: &str) -> Result<String, ForecastError> {
    value.ok_or_else(|| ForecastError::InvalidRequest(format!("Missing required field: {}", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> FileListRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_codes_and_names() {
        let by_name = build_request(request(json!({
            "run": "short_range", "variable": "forcing", "geography": "conus",
            "start_date": "20240601", "cycles": [0], "lead_times": [1, 2]
        })))
        .unwrap();
        let by_code = build_request(request(json!({
            "runtype": 1, "varinput": "5", "geoinput": 1,
            "start_date": 20240601, "fcst_cycle": ["0"], "lead_time": [1, 2]
        })))
        .unwrap();
        let files = by_name.create_file_list();
        assert_eq!(files.len(), 2);
        assert!(files[0]
            .as_str()
            .ends_with("nwm.t00z.short_range.forcing.f001.conus.nc"));
        assert_eq!(by_code.create_file_list(), files);
    }

    #[test]
    fn test_missing_fields() {
        let err = build_request(request(json!({"variable": "forcing"}))).unwrap_err();
        assert!(err.to_string().contains("run"));
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_invalid_combination() {
        let err = build_request(request(json!({
            "run": "short_range", "variable": "forcing", "geography": "conus",
            "member": 3, "start_date": "20240601"
        })))
        .unwrap_err();
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_json_suffix_and_date_range() {
        let request = build_request(request(json!({
            "run": "short_range", "variable": "forcing", "geography": "conus",
            "start_date": "20240601", "end_date": "20240602",
            "cycles": [0], "lead_times": [1], "append_json": true
        })))
        .unwrap();
        let files = request.create_file_list();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.as_str().ends_with(".nc.json")));
    }
}
