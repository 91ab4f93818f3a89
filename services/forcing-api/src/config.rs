//! Service configuration loading.
//!
//! Precedence, lowest first: built-in defaults, the optional YAML file,
//! `NWM_*` / `FORCING_*` environment variables, then CLI flags applied by
//! `main`.

use anyhow::{Context, Result};
use grid_processor::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for the forcing API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Forecast product and cache settings.
    pub pipeline: PipelineConfig,

    /// Outbound HTTP client settings.
    pub http: HttpConfig,

    /// Hourly probes made by `/latest_forecast`.
    pub latest_max_checks: usize,
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 8,
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

const DEFAULT_LATEST_MAX_CHECKS: usize = 24;

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            http: HttpConfig::default(),
            latest_max_checks: DEFAULT_LATEST_MAX_CHECKS,
        }
    }
}

impl ServiceConfig {
    /// Load from an optional YAML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };

        config.pipeline = config
            .pipeline
            .with_env_overrides()
            .context("Invalid NWM_* environment override")?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file. Missing keys take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        tracing::info!(path = %path.display(), "Loaded service configuration");
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_parse("FORCING_HTTP_TIMEOUT_SECS")? {
            self.http.request_timeout_secs = v;
        }
        if let Some(v) = env_parse("FORCING_HTTP_CONNECT_TIMEOUT_SECS")? {
            self.http.connect_timeout_secs = v;
        }
        if let Some(v) = env_parse("FORCING_LATEST_MAX_CHECKS")? {
            self.latest_max_checks = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline
            .validate()
            .context("Invalid pipeline configuration")?;
        if self.latest_max_checks == 0 {
            anyhow::bail!("latest_max_checks must be at least 1");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{}={:?}: {}", key, raw, e)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_partial_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "pipeline:\n  run: medium_range\n  variable: forcing\n  field_cache: lru:32\nhttp:\n  request_timeout_secs: 5\n"
        )
        .unwrap();

        let config = ServiceConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.pipeline.run.to_string(), "medium_range");
        assert_eq!(config.pipeline.field_cache.to_string(), "lru:32");
        assert_eq!(config.pipeline.variable_name, "RAINRATE");
        assert_eq!(config.http.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.http.connect_timeout_secs, 10);
    }

    #[test]
    fn test_missing_file() {
        let err = ServiceConfig::from_yaml_file(Path::new("/nonexistent/forcing.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_zero_checks_rejected() {
        let config = ServiceConfig {
            latest_max_checks: 0,
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
