//! HTTP resource fetcher.
//!
//! Sidecars and chunk blobs are read over HTTPS. `s3://` and `gs://`
//! identifiers are rewritten to their public HTTPS endpoints first.

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use grid_processor::loader::slice_range;
use grid_processor::{ForecastError, ResourceFetcher, Result};
use reqwest::{header, Client, StatusCode};
use tracing::{debug, instrument};

use crate::config::HttpConfig;

/// [`ResourceFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_nodelay(true)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str, range: Option<(u64, u64)>) -> Result<reqwest::Response> {
        let resolved = resolve_url(url);
        let mut request = self.client.get(&resolved);
        if let Some((offset, length)) = range {
            request = request.header(header::RANGE, range_header(offset, length));
        }
        let response = request.send().await.map_err(|e| request_error(url, e))?;
        if !response.status().is_success() {
            return Err(ForecastError::load_failure(
                url,
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let response = self.get(url, None).await?;
        let body = response.bytes().await.map_err(|e| request_error(url, e))?;
        debug!(bytes = body.len(), "Fetched object");
        Ok(body)
    }

    async fn fetch_range(&self, url: &str, offset: u64, length: u64) -> Result<Bytes> {
        let response = self.get(url, Some((offset, length))).await?;
        let partial = response.status() == StatusCode::PARTIAL_CONTENT;
        let body = response.bytes().await.map_err(|e| request_error(url, e))?;
        if partial {
            if body.len() as u64 != length {
                return Err(ForecastError::load_failure(
                    url,
                    format!("expected {} bytes, got {}", length, body.len()),
                ));
            }
            Ok(body)
        } else {
            // Server ignored the Range header and sent the whole object.
            slice_range(url, body, offset, length)
        }
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        let response = self
            .client
            .head(resolve_url(url))
            .send()
            .await
            .map_err(|e| request_error(url, e))?;
        Ok(response.status().is_success())
    }
}

/// Rewrite cloud bucket schemes to public HTTPS URLs.
pub fn resolve_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("s3://") {
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        format!("https://{}.s3.amazonaws.com/{}", bucket, key)
    } else if let Some(rest) = url.strip_prefix("gs://") {
        format!("https://storage.googleapis.com/{}", rest)
    } else {
        url.to_string()
    }
}

/// Inclusive byte range header value.
fn range_header(offset: u64, length: u64) -> String {
    format!("bytes={}-{}", offset, offset + length.saturating_sub(1))
}

fn request_error(url: &str, e: reqwest::Error) -> ForecastError {
    if e.is_timeout() {
        ForecastError::Timeout(url.to_string())
    } else {
        ForecastError::load_failure(url, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("s3://noaa-nwm-pds/nwm.20240601/a.nc"),
            "https://noaa-nwm-pds.s3.amazonaws.com/nwm.20240601/a.nc"
        );
        assert_eq!(
            resolve_url("gs://national-water-model/nwm.20240601/a.nc"),
            "https://storage.googleapis.com/national-water-model/nwm.20240601/a.nc"
        );
        assert_eq!(resolve_url("https://example.com/a.json"), "https://example.com/a.json");
    }

    #[test]
    fn test_range_header() {
        assert_eq!(range_header(100, 50), "bytes=100-149");
        assert_eq!(range_header(0, 1), "bytes=0-0");
    }

    #[test]
    fn test_client_builds() {
        assert!(HttpFetcher::new(&HttpConfig::default()).is_ok());
    }
}
