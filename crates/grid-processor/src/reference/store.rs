//! zarrs storage backed by a reference set.
//!
//! Keys resolve through the reference set: inline entries are served from
//! memory and remote entries with a ranged fetch through the
//! [`ResourceFetcher`]. Keys the set does not name are absent, so zarrs
//! reads those chunks as the array fill value.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use zarrs_storage::byte_range::ByteRange;
use zarrs_storage::{AsyncReadableStorageTraits, MaybeBytes, StorageError, StoreKey};

use super::{ChunkRef, ReferenceSet};
use crate::error::{ForecastError, Result};
use crate::loader::{with_timeout, ResourceFetcher};

/// Readable zarrs store over one reference set.
///
/// Fetched chunk bytes are kept for the lifetime of the store, so one
/// store per read fetches each chunk once. The first fetch error is kept
/// as a [`ForecastError`] because zarrs only carries a message.
pub struct ReferenceStore {
    refs: Arc<ReferenceSet>,
    fetcher: Arc<dyn ResourceFetcher>,
    timeout: Duration,
    permits: Semaphore,
    fetched: Mutex<HashMap<String, Bytes>>,
    failure: Mutex<Option<ForecastError>>,
}

impl ReferenceStore {
    /// `concurrency` bounds remote fetches in flight.
    pub fn new(
        refs: Arc<ReferenceSet>,
        fetcher: Arc<dyn ResourceFetcher>,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            refs,
            fetcher,
            timeout,
            permits: Semaphore::new(concurrency.max(1)),
            fetched: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
        }
    }

    /// The first fetch error seen, if any.
    pub fn take_failure(&self) -> Option<ForecastError> {
        lock(&self.failure).take()
    }

    async fn resolve(&self, key: &str) -> Result<Option<Bytes>> {
        let (url, range) = match self.refs.get(key) {
            None => return Ok(None),
            Some(ChunkRef::Inline(bytes)) => return Ok(Some(bytes.clone())),
            Some(ChunkRef::Remote { url, range }) => (url, *range),
        };
        if let Some(bytes) = lock(&self.fetched).get(key) {
            return Ok(Some(bytes.clone()));
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ForecastError::load_failure(key, "chunk fetch pool closed"))?;
        let fetch = async {
            match range {
                Some((offset, length)) => self.fetcher.fetch_range(url, offset, length).await,
                None => self.fetcher.fetch(url).await,
            }
        };
        let bytes = with_timeout(self.timeout, key, fetch).await?;
        lock(&self.fetched).insert(key.to_string(), bytes.clone());
        Ok(Some(bytes))
    }

    async fn get_bytes(&self, key: &StoreKey) -> std::result::Result<MaybeBytes, StorageError> {
        self.resolve(key.as_str()).await.map_err(|e| self.record(e))
    }

    fn record(&self, error: ForecastError) -> StorageError {
        let message = error.to_string();
        let mut slot = lock(&self.failure);
        if slot.is_none() {
            *slot = Some(error);
        }
        StorageError::Other(message)
    }
}

#[async_trait]
impl AsyncReadableStorageTraits for ReferenceStore {
    async fn get(&self, key: &StoreKey) -> std::result::Result<MaybeBytes, StorageError> {
        self.get_bytes(key).await
    }

    async fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> std::result::Result<Option<Vec<Bytes>>, StorageError> {
        let Some(bytes) = self.get_bytes(key).await? else {
            return Ok(None);
        };
        byte_ranges
            .iter()
            .map(|range| {
                slice(&bytes, range).ok_or_else(|| {
                    StorageError::Other(format!(
                        "byte range {:?} is outside {} ({} bytes)",
                        range,
                        key.as_str(),
                        bytes.len()
                    ))
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Some)
    }

    async fn size_key(&self, key: &StoreKey) -> std::result::Result<Option<u64>, StorageError> {
        match self.refs.get(key.as_str()) {
            None => Ok(None),
            Some(ChunkRef::Inline(bytes)) => Ok(Some(bytes.len() as u64)),
            Some(ChunkRef::Remote {
                range: Some((_, length)),
                ..
            }) => Ok(Some(*length)),
            Some(ChunkRef::Remote { range: None, .. }) => {
                Ok(self.get_bytes(key).await?.map(|b| b.len() as u64))
            }
        }
    }
}

impl std::fmt::Debug for ReferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceStore")
            .field("references", &self.refs.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn slice(bytes: &Bytes, range: &ByteRange) -> Option<Bytes> {
    let size = bytes.len() as u64;
    let (start, end) = match *range {
        ByteRange::FromStart(offset, None) => (offset, size),
        ByteRange::FromStart(offset, Some(length)) => (offset, offset.checked_add(length)?),
        ByteRange::Suffix(length) => (size.checked_sub(length)?, size),
    };
    (start <= end && end <= size).then(|| bytes.slice(start as usize..end as usize))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
