// # Memory Cache Store
//
// In-memory implementation of CacheStore.
//
// ## Purpose
//
// A fast cache that doesn't persist across processes. Used when caching to
// disk is unwanted or the cache file cannot be opened, and in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::Error;
use crate::record::LocationRecord;
use crate::traits::cache_store::{CacheEntry, CacheStore};

/// In-memory cache store implementation
///
/// # Example
///
/// ```rust,no_run
/// use geofuse_core::cache::MemoryCacheStore;
/// use geofuse_core::traits::CacheStore;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryCacheStore::new(Duration::from_secs(3600));
///     assert_eq!(store.get("location_optimal").await?, None);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryCacheStore {
    ttl: Duration,
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryCacheStore {
    /// Create a new empty memory cache store
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Seed an entry with an explicit storage time
    pub fn with_entry(self, key: &str, record: LocationRecord, stored_at: DateTime<Utc>) -> Self {
        // Not shared yet, so the lock is uncontended
        if let Ok(mut guard) = self.inner.try_write() {
            guard.insert(key.to_string(), CacheEntry::stored_at(record, stored_at));
        }
        self
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<LocationRecord>, Error> {
        let mut guard = self.inner.write().await;
        match guard.get(key) {
            None => Ok(None),
            Some(entry) if entry.is_expired(self.ttl, Utc::now()) => {
                guard.remove(key);
                tracing::debug!("Evicted expired cache entry {}", key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.data.clone())),
        }
    }

    async fn set(&self, key: &str, record: &LocationRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(key.to_string(), CacheEntry::new(record.clone()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.clear();
        Ok(())
    }

    async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    async fn flush(&self) -> Result<(), Error> {
        // No-op for memory store
        Ok(())
    }
}
