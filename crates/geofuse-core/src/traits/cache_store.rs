// # Cache Store Trait
//
// Defines the interface for the result cache.
//
// ## Purpose
//
// The cache holds the last successfully resolved record so a short-lived
// process can answer without contacting any provider. Entries expire after a
// configured TTL; eviction is lazy (checked on read, swept on load).
//
// ## Implementations
//
// - File-based: JSON map written on every update (`FileCacheStore`)
// - In-memory: non-durable (`MemoryCacheStore`)
//
// ## File Format
//
// ```json
// {
//   "location_optimal": {
//     "data": { "city": "Paris", "latitude": 48.85, "...": "..." },
//     "timestamp": 1736424000000
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::record::LocationRecord;

/// One cached record with its storage time
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CacheEntry {
    /// The cached record
    pub data: LocationRecord,
    /// When the record was stored (milliseconds since the epoch on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry stored now
    pub fn new(data: LocationRecord) -> Self {
        Self::stored_at(data, Utc::now())
    }

    /// Create an entry with an explicit storage time
    pub fn stored_at(data: LocationRecord, timestamp: DateTime<Utc>) -> Self {
        Self { data, timestamp }
    }

    /// Check if the entry is older than `ttl` at `now`
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.timestamp);
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => age > ttl,
            // A TTL beyond chrono's range never expires
            Err(_) => false,
        }
    }
}

/// Trait for cache store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Failure Semantics
///
/// A store that cannot read its backing storage must behave as empty rather
/// than fail; `get` only errors on internal faults. Write failures are
/// reported to the caller, which decides whether they are fatal.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a non-expired record
    ///
    /// # Returns
    ///
    /// - `Ok(Some(LocationRecord))`: A fresh record
    /// - `Ok(None)`: Missing or expired (expired entries are evicted)
    /// - `Err(Error)`: Storage error
    async fn get(&self, key: &str) -> Result<Option<LocationRecord>, crate::Error>;

    /// Store a record under `key`, stamped with the current time
    ///
    /// Durable implementations persist before returning.
    async fn set(&self, key: &str, record: &LocationRecord) -> Result<(), crate::Error>;

    /// Remove one entry (no-op if missing)
    async fn remove(&self, key: &str) -> Result<(), crate::Error>;

    /// Remove every entry
    async fn clear(&self) -> Result<(), crate::Error>;

    /// Number of stored entries, expired ones included until evicted
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
