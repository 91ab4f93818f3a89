//! Dataset loading.
//!
//! A load fetches one reference sidecar through a [`ResourceFetcher`] and
//! returns a lazy [`ReferenceDataset`]. Chunk data is only fetched when a
//! grid is read from it.

pub mod fetchers;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use nwm_urlgen::ResourceIdentifier;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::dataset::ReferenceDataset;
use crate::error::{ForecastError, Result};
use crate::reference::ReferenceSet;

pub use fetchers::{FileFetcher, MemoryFetcher};

/// Default per-load timeout.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of concurrent chunk fetches within one read.
pub const DEFAULT_CHUNK_CONCURRENCY: usize = 8;

/// Byte source for sidecars and chunk data.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch a whole object.
    async fn fetch(&self, url: &str) -> Result<Bytes>;

    /// Fetch `length` bytes starting at `offset`.
    ///
    /// The default fetches the whole object and slices it.
    async fn fetch_range(&self, url: &str, offset: u64, length: u64) -> Result<Bytes> {
        let whole = self.fetch(url).await?;
        slice_range(url, whole, offset, length)
    }

    /// Whether the object exists. Fetch failures count as absent.
    async fn exists(&self, url: &str) -> Result<bool> {
        match self.fetch(url).await {
            Ok(_) => Ok(true),
            Err(ForecastError::LoadFailure { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Cut `[offset, offset + length)` out of a fetched object.
pub fn slice_range(url: &str, whole: Bytes, offset: u64, length: u64) -> Result<Bytes> {
    let start = offset as usize;
    let end = start.saturating_add(length as usize);
    if end > whole.len() {
        return Err(ForecastError::load_failure(
            url,
            format!(
                "range {}..{} is past the end of a {} byte object",
                start,
                end,
                whole.len()
            ),
        ));
    }
    Ok(whole.slice(start..end))
}

/// Run a fetch under a timeout, mapping expiry to [`ForecastError::Timeout`].
pub async fn with_timeout<T>(
    timeout: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ForecastError::Timeout(format!(
            "{} did not complete within {:?}",
            what, timeout
        ))),
    }
}

/// How a batch of loads is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// One at a time, in order, stopping at the first failure.
    #[default]
    Sequential,
    /// Up to `workers` loads in flight. Results keep input order.
    Parallel,
}

/// Loads reference datasets from resource identifiers.
#[derive(Clone)]
pub struct DatasetLoader {
    fetcher: Arc<dyn ResourceFetcher>,
    timeout: Duration,
    workers: usize,
    chunk_concurrency: usize,
}

impl DatasetLoader {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            timeout: DEFAULT_LOAD_TIMEOUT,
            workers: num_cpus::get_physical().max(1),
            chunk_concurrency: DEFAULT_CHUNK_CONCURRENCY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Concurrent loads in parallel mode; 0 keeps the physical core count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        if workers > 0 {
            self.workers = workers;
        }
        self
    }

    pub fn with_chunk_concurrency(mut self, chunk_concurrency: usize) -> Self {
        self.chunk_concurrency = chunk_concurrency.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn fetcher(&self) -> &Arc<dyn ResourceFetcher> {
        &self.fetcher
    }

    /// Load one dataset.
    #[instrument(skip(self, id), fields(id = %id))]
    pub async fn load(&self, id: &ResourceIdentifier) -> Result<ReferenceDataset> {
        metrics::counter!("forcing_loads_total").increment(1);
        let result = self.load_inner(id).await;
        if let Err(e) = &result {
            metrics::counter!("forcing_load_failures_total").increment(1);
            warn!(error = %e, "Dataset load failed");
        }
        result
    }

    async fn load_inner(&self, id: &ResourceIdentifier) -> Result<ReferenceDataset> {
        let url = id.as_str();
        let bytes = with_timeout(self.timeout, url, self.fetcher.fetch(url)).await?;
        let refs = ReferenceSet::from_json(url, &bytes)?;
        debug!(size = bytes.len(), references = refs.len(), "Loaded reference set");

        Ok(ReferenceDataset::new(
            url,
            refs,
            Arc::clone(&self.fetcher),
            self.chunk_concurrency,
            self.timeout,
        ))
    }

    /// Load several datasets. Output order matches `ids`; any failure
    /// fails the batch.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn load_all(
        &self,
        ids: &[ResourceIdentifier],
        mode: LoadMode,
    ) -> Result<Vec<ReferenceDataset>> {
        match mode {
            LoadMode::Sequential => {
                let mut datasets = Vec::with_capacity(ids.len());
                for id in ids {
                    datasets.push(self.load(id).await?);
                }
                Ok(datasets)
            }
            LoadMode::Parallel => {
                stream::iter(ids)
                    .map(|id| self.load(id))
                    .buffered(self.workers)
                    .try_collect()
                    .await
            }
        }
    }

    /// Probe whether a sidecar exists.
    pub async fn exists(&self, id: &ResourceIdentifier) -> Result<bool> {
        let url = id.as_str();
        with_timeout(self.timeout, url, self.fetcher.exists(url)).await
    }
}

impl std::fmt::Debug for DatasetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetLoader")
            .field("timeout", &self.timeout)
            .field("workers", &self.workers)
            .field("chunk_concurrency", &self.chunk_concurrency)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowFetcher;

    #[async_trait]
    impl ResourceFetcher for SlowFetcher {
        async fn fetch(&self, _url: &str) -> Result<Bytes> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Bytes::from_static(b"{}"))
        }
    }

    #[test]
    fn test_slice_range() {
        let whole = Bytes::from_static(b"0123456789");
        assert_eq!(slice_range("u", whole.clone(), 2, 3).unwrap(), Bytes::from_static(b"234"));
        assert!(slice_range("u", whole, 8, 3).is_err());
    }

    #[tokio::test]
    async fn test_load_timeout() {
        let loader = DatasetLoader::new(Arc::new(SlowFetcher)).with_timeout(Duration::from_millis(20));
        let err = loader
            .load(&ResourceIdentifier::new("slow.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::Timeout(_)));
        assert_eq!(err.http_status_code(), 504);
    }

    /// Implements only `fetch`, so the trait defaults are exercised.
    struct SingleObject;

    #[async_trait]
    impl ResourceFetcher for SingleObject {
        async fn fetch(&self, url: &str) -> Result<Bytes> {
            if url == "a" {
                Ok(Bytes::from_static(b"abcdef"))
            } else {
                Err(ForecastError::load_failure(url, "not found"))
            }
        }
    }

    #[tokio::test]
    async fn test_default_range_and_exists() {
        let fetcher = SingleObject;
        assert_eq!(
            fetcher.fetch_range("a", 1, 2).await.unwrap(),
            Bytes::from_static(b"bc")
        );
        assert!(fetcher.fetch_range("a", 5, 2).await.is_err());
        assert!(fetcher.exists("a").await.unwrap());
        assert!(!fetcher.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_json_is_load_failure() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("bad.json", Bytes::from_static(b"{nope"));
        let loader = DatasetLoader::new(fetcher);
        let err = loader
            .load(&ResourceIdentifier::new("bad.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::LoadFailure { .. }));
    }
}
