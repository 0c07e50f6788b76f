//! Read-through TTL cache for analytics results
//!
//! Entries are JSON `{value, fetchedAtMs}` blobs kept in a pluggable
//! key/value store. Unparsable entries are dropped on read.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of "now" in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Raw key/value storage behind the cache
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, payload: String);
    fn remove(&self, key: &str);
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, payload: String) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), payload);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }
}

/// Store persisted as a single JSON object on disk, rewritten on every change
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileCacheStore {
    /// Open (or start) the cache file. A corrupt file is discarded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache dir {}", parent.display()))?;
        }

        let entries = if path.exists() {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read cache file {}", path.display()))?;
            match serde_json::from_str::<HashMap<String, String>>(&json) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cache file is corrupt, starting empty");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        info!(path = %path.display(), entries = entries.len(), "📂 Analytics cache opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        let result = serde_json::to_string_pretty(entries)
            .map_err(anyhow::Error::from)
            .and_then(|json| fs::write(&self.path, json).map_err(anyhow::Error::from));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to persist analytics cache");
        }
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, payload: String) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), payload);
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at_ms: i64,
}

/// TTL read-through cache with stale-on-error fallback
#[derive(Clone)]
pub struct AnalyticsCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl AnalyticsCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Cached value for `key` if fresh and valid, otherwise `fetch_fresh()`.
    ///
    /// Only valid fresh values are stored. When the fetch fails the last
    /// cached value is returned even if expired, else `T::default()`.
    pub async fn get<T, V, F, Fut>(&self, key: &str, ttl: Duration, is_valid: V, fetch_fresh: F) -> T
    where
        T: Serialize + DeserializeOwned + Default,
        V: Fn(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let now = self.clock.now_ms();
        let cached = match self.read::<T>(key) {
            Some(entry) if Self::within_ttl(&entry, now, ttl) && is_valid(&entry.value) => {
                debug!(key, "Returning cached analytics");
                return entry.value;
            }
            other => other,
        };

        if cached.is_some() {
            debug!(key, "Cached analytics expired or degenerate, fetching fresh");
        }

        match fetch_fresh().await {
            Ok(value) => {
                if is_valid(&value) {
                    self.put(key, &value, self.clock.now_ms());
                    info!(key, "Analytics fetched and cached");
                } else {
                    warn!(key, "Fetched analytics are degenerate, not caching");
                }
                value
            }
            Err(e) => match cached {
                Some(entry) => {
                    warn!(key, error = %e, "Analytics fetch failed, returning cached value");
                    entry.value
                }
                None => {
                    warn!(key, error = %e, "Analytics fetch failed, returning default");
                    T::default()
                }
            },
        }
    }

    /// Store `value` under `key` as fetched at `fetched_at_ms`
    pub fn put<T: Serialize>(&self, key: &str, value: &T, fetched_at_ms: i64) {
        let entry = CacheEntry {
            value,
            fetched_at_ms,
        };
        match serde_json::to_string(&entry) {
            Ok(payload) => self.store.set(key, payload),
            Err(e) => warn!(key, error = %e, "Failed to serialize cache entry"),
        }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, error = %e, "Dropping corrupt cache entry");
                self.store.remove(key);
                None
            }
        }
    }

    fn within_ttl<T>(entry: &CacheEntry<T>, now_ms: i64, ttl: Duration) -> bool {
        let age = now_ms - entry.fetched_at_ms;
        age >= 0 && (age as u128) < ttl.as_millis()
    }
}
