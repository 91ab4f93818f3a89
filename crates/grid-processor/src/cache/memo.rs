//! Memoization caches for loaded fields, payloads and polygons.

use lru::LruCache;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::ForecastError;
use crate::types::CacheStats;

/// How a [`MemoCache`] bounds its size.
///
/// Serialized as `"unbounded"` or `"lru:<capacity>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EvictionPolicy {
    /// Entries are never evicted.
    Unbounded,
    /// Least recently used entries are evicted beyond `capacity`.
    Lru { capacity: NonZeroUsize },
}

impl EvictionPolicy {
    pub fn lru(capacity: usize) -> Result<Self, ForecastError> {
        NonZeroUsize::new(capacity)
            .map(|capacity| Self::Lru { capacity })
            .ok_or_else(|| ForecastError::invalid_configuration("lru capacity must be > 0"))
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::Unbounded
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::Lru { capacity } => write!(f, "lru:{}", capacity),
        }
    }
}

impl FromStr for EvictionPolicy {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "unbounded" {
            return Ok(Self::Unbounded);
        }
        match s.strip_prefix("lru:") {
            Some(n) => {
                let capacity = n.parse::<usize>().map_err(|_| {
                    ForecastError::invalid_configuration(format!("invalid lru capacity: {}", n))
                })?;
                Self::lru(capacity)
            }
            None => Err(ForecastError::invalid_configuration(format!(
                "unknown eviction policy: {} (expected unbounded or lru:<n>)",
                s
            ))),
        }
    }
}

impl TryFrom<String> for EvictionPolicy {
    type Error = ForecastError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EvictionPolicy> for String {
    fn from(policy: EvictionPolicy) -> Self {
        policy.to_string()
    }
}

/// Thread-safe memo cache.
///
/// Values are stored behind `Arc` so a hit is a pointer copy. Two callers
/// missing on the same key at once both compute the value; the last
/// insert wins.
pub struct MemoCache<K, V> {
    name: &'static str,
    policy: EvictionPolicy,
    inner: Mutex<LruCache<K, Arc<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Hash + Eq, V> MemoCache<K, V> {
    /// Create a cache. `name` labels its metrics.
    pub fn new(name: &'static str, policy: EvictionPolicy) -> Self {
        let inner = match policy {
            EvictionPolicy::Unbounded => LruCache::unbounded(),
            EvictionPolicy::Lru { capacity } => LruCache::new(capacity),
        };
        Self {
            name,
            policy,
            inner: Mutex::new(inner),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, Arc<V>>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Look up a value, counting the hit or miss.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let found = self.lock().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("memo_cache_hits_total", "cache" => self.name).increment(1);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("memo_cache_misses_total", "cache" => self.name).increment(1);
        }
        found
    }

    /// Insert a value and return the shared handle.
    pub fn insert(&self, key: K, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let mut inner = self.lock();
        let replacing = inner.contains(&key);
        // `push` returns the displaced entry: the old value on replace,
        // the least recently used entry on eviction.
        if inner.push(key, Arc::clone(&value)).is_some() && !replacing {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Return the cached value or compute, store and return it.
    pub fn get_or_insert_with<F>(&self, key: K, compute: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        if let Some(v) = self.get(&key) {
            return v;
        }
        self.insert(key, compute())
    }

    /// Fallible variant of [`get_or_insert_with`](Self::get_or_insert_with).
    /// Errors are not cached.
    pub fn try_get_or_insert_with<F, E>(&self, key: K, compute: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(v) = self.get(&key) {
            return Ok(v);
        }
        Ok(self.insert(key, compute()?))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> fmt::Debug for MemoCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCache")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse() {
        assert_eq!("unbounded".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Unbounded);
        assert_eq!(
            "LRU:32".parse::<EvictionPolicy>().unwrap(),
            EvictionPolicy::lru(32).unwrap()
        );
        assert!("lru:0".parse::<EvictionPolicy>().is_err());
        assert!("lru:x".parse::<EvictionPolicy>().is_err());
        assert!("fifo".parse::<EvictionPolicy>().is_err());
        assert_eq!(EvictionPolicy::lru(8).unwrap().to_string(), "lru:8");
    }

    #[test]
    fn test_policy_serde() {
        let p: EvictionPolicy = serde_json::from_str("\"lru:4\"").unwrap();
        assert_eq!(p, EvictionPolicy::lru(4).unwrap());
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"lru:4\"");
        assert!(serde_json::from_str::<EvictionPolicy>("\"lru:-1\"").is_err());
    }

    #[test]
    fn test_insert_and_get() {
        let cache: MemoCache<u32, String> = MemoCache::new("test", EvictionPolicy::Unbounded);
        assert!(cache.get(&1).is_none());
        cache.insert(1, "one".to_string());
        assert_eq!(cache.get(&1).as_deref().map(String::as_str), Some("one"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_get_or_insert_computes_once() {
        let cache: MemoCache<&str, u64> = MemoCache::new("test", EvictionPolicy::Unbounded);
        let mut calls = 0;
        let a = cache.get_or_insert_with("k", || {
            calls += 1;
            42
        });
        let b = cache.get_or_insert_with("k", || {
            calls += 1;
            7
        });
        assert_eq!(*a, 42);
        assert_eq!(*b, 42);
        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_errors_not_cached() {
        let cache: MemoCache<u8, u8> = MemoCache::new("test", EvictionPolicy::Unbounded);
        let err: Result<_, &str> = cache.try_get_or_insert_with(1, || Err("boom"));
        assert!(err.is_err());
        assert!(!cache.contains(&1));
        let ok: Result<_, &str> = cache.try_get_or_insert_with(1, || Ok(5));
        assert_eq!(*ok.unwrap(), 5);
    }

    #[test]
    fn test_lru_eviction() {
        let cache: MemoCache<u32, u32> = MemoCache::new("test", EvictionPolicy::lru(2).unwrap());
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.get(&1);
        cache.insert(3, 3);

        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert!(cache.contains(&3));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let cache: MemoCache<u32, u32> = MemoCache::new("test", EvictionPolicy::Unbounded);
        for i in 0..1000 {
            cache.insert(i, i);
        }
        assert_eq!(cache.len(), 1000);
        assert_eq!(cache.stats().evictions, 0);
        cache.clear();
        assert!(cache.is_empty());
    }
}
