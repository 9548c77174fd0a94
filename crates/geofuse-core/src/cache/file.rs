// # File Cache Store
//
// File-based implementation of CacheStore with crash recovery.
//
// ## Purpose
//
// Keeps the last resolved location across process invocations. The locator
// is expected to run once per request, so the file is read once at open and
// written synchronously on every update.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Automatic backup: Keeps .backup of the previous file
// - Recovery: Falls back to backup, then to an empty cache, if the file
//   cannot be read or parsed. A broken cache is a cache miss, never fatal.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::record::LocationRecord;
use crate::traits::cache_store::{CacheEntry, CacheStore};

/// File-based cache store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use geofuse_core::cache::FileCacheStore;
/// use geofuse_core::traits::CacheStore;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileCacheStore::open("location_cache.json", Duration::from_secs(3600)).await?;
///
///     if let Some(record) = store.get("location_optimal").await? {
///         println!("cached: {:?}", record.city);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl FileCacheStore {
    /// Create or load a file cache store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the cache file, falling back to the backup, then to empty
    /// 3. Drop entries older than `ttl`
    pub async fn open<P: AsRef<Path>>(path: P, ttl: Duration) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::cache(format!(
                    "Failed to create cache directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut entries = Self::load_with_recovery(&path).await;

        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(ttl, now));
        if entries.len() < before {
            tracing::debug!("Swept {} expired cache entries", before - entries.len());
        }

        Ok(Self {
            path,
            ttl,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// Load cache from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main cache file
    /// 2. If that fails for any reason, try loading backup
    /// 3. If backup also fails, start with empty cache
    async fn load_with_recovery(path: &Path) -> HashMap<String, CacheEntry> {
        let e = match Self::load(path).await {
            Ok(entries) => {
                tracing::debug!("Loaded cache from file: {} entries", entries.len());
                return entries;
            }
            Err(e) => e,
        };

        tracing::warn!("Cache file unreadable: {}. Attempting recovery from backup.", e);

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty cache.");
            return HashMap::new();
        }

        match Self::load(&backup_path).await {
            Ok(entries) => {
                tracing::info!("Recovered cache from backup: {} entries", entries.len());

                if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await {
                    tracing::error!("Failed to restore cache file from backup: {}", restore_err);
                }

                entries
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also unreadable: {}. Starting with empty cache.",
                    backup_err
                );
                HashMap::new()
            }
        }
    }

    /// Load cache from file
    async fn load(path: &Path) -> Result<HashMap<String, CacheEntry>, Error> {
        if !path.exists() {
            tracing::debug!("Cache file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::cache(format!("Failed to read cache file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            Error::cache(format!(
                "Failed to parse cache file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Write entries to file atomically
    ///
    /// Callers hold the write guard, so writes never interleave.
    async fn write_entries(&self, entries: &HashMap<String, CacheEntry>) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| Error::cache(format!("Failed to serialize cache: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::cache(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::cache(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::cache(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create cache backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::cache(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Cache written to file: {}", self.path.display());
        Ok(())
    }

    /// Restore cache file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::cache(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored cache file from backup");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<LocationRecord>, Error> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(self.ttl, Utc::now()) => {
                    return Ok(Some(entry.data.clone()));
                }
                Some(_) => {}
            }
        }

        // Expired: evict lazily, the file catches up on the next write
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(self.ttl, Utc::now()))
        {
            entries.remove(key);
            tracing::debug!("Evicted expired cache entry {}", key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, record: &LocationRecord) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), CacheEntry::new(record.clone()));

        // Immediate write for durability
        self.write_entries(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_some() {
            self.write_entries(&entries).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        entries.clear();
        self.write_entries(&entries).await
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn flush(&self) -> Result<(), Error> {
        let entries = self.entries.write().await;
        self.write_entries(&entries).await
    }
}
