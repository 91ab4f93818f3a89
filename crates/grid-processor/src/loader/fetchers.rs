//! In-memory and filesystem fetchers.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{slice_range, ResourceFetcher};
use crate::error::{ForecastError, Result};

/// Fetcher over an in-memory map of URL to bytes.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    objects: RwLock<HashMap<String, Bytes>>,
    fetches: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, data: impl Into<Bytes>) {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.into(), data.into());
    }

    pub fn remove(&self, url: &str) -> Option<Bytes> {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(url)
    }

    /// Number of `fetch`/`fetch_range` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn lookup(&self, url: &str) -> Result<Bytes> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
            .ok_or_else(|| ForecastError::load_failure(url, "not found"))
    }
}

#[async_trait]
impl ResourceFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        self.lookup(url)
    }

    async fn fetch_range(&self, url: &str, offset: u64, length: u64) -> Result<Bytes> {
        slice_range(url, self.lookup(url)?, offset, length)
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(url))
    }
}

/// Fetcher that reads from the local filesystem.
///
/// URLs may be plain paths or `file://` URLs. Relative paths resolve
/// against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ResourceFetcher for FileFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        tokio::fs::read(self.resolve(url))
            .await
            .map(Bytes::from)
            .map_err(|e| ForecastError::load_failure(url, e.to_string()))
    }

    async fn fetch_range(&self, url: &str, offset: u64, length: u64) -> Result<Bytes> {
        let fail = |e: std::io::Error| ForecastError::load_failure(url, e.to_string());
        let mut file = tokio::fs::File::open(self.resolve(url)).await.map_err(fail)?;
        file.seek(std::io::SeekFrom::Start(offset)).await.map_err(fail)?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf).await.map_err(fail)?;
        Ok(Bytes::from(buf))
    }

    async fn exists(&self, url: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(url)).await.unwrap_or(false))
    }
}
