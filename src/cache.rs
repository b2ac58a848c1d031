//! Result Cache
//!
//! Content-addressed store of successful chart runs, keyed by [`CacheKey`]. Backed by a sled
//! database with bincode-encoded values; every write is flushed. Entries are created only
//! from successful runs and live until cleared, unless a `max_age` is configured.

use crate::error::StorageError;
use crate::pipeline::{ChartKind, CodeOrigin};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub mod flight;
pub mod key;

pub use flight::SingleFlight;
pub use key::CacheKey;

/// Cache configuration (`[cache]` section)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Database directory; defaults to `<user cache dir>/chartgate/cache`
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Entries older than this are misses; unset means no expiry
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            path: None,
            max_age_secs: None,
        }
    }
}

/// Default cache database location
pub fn default_cache_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "chartgate")
        .map(|dirs| dirs.cache_dir().join("cache"))
        .unwrap_or_else(|| PathBuf::from(".chartgate/cache"))
}

impl CacheConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_cache_path)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(path) = &self.path {
            if path.as_os_str().is_empty() {
                return Err("Cache path cannot be empty".to_string());
            }
        }
        if self.max_age_secs == Some(0) {
            return Err("max_age_secs must be greater than zero when set".to_string());
        }
        Ok(())
    }
}

/// Stored payload for one successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedChart {
    pub artifact_path: PathBuf,
    pub chart_kind: ChartKind,
    pub description: String,
    pub code: String,
    pub origin: CodeOrigin,
    pub created_at: DateTime<Utc>,
}

pub struct ResultCache {
    db: sled::Db,
    max_age: Option<Duration>,
}

impl ResultCache {
    /// Open (or create) the cache database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| {
            if is_lock_conflict(&e) {
                StorageError::Locked(path.display().to_string())
            } else {
                StorageError::backend("Failed to open cache database", e)
            }
        })?;
        Ok(Self { db, max_age: None })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, StorageError> {
        let cache = Self::open(config.resolved_path())?;
        Ok(cache.with_max_age(config.max_age_secs.map(Duration::from_secs)))
    }

    /// In-memory database removed on drop
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StorageError::backend("Failed to open temporary cache", e))?;
        Ok(Self { db, max_age: None })
    }

    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Lookup by key. Expired and undecodable entries are evicted and reported as misses.
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<CachedChart>, StorageError> {
        let Some(raw) = self
            .db
            .get(key.as_bytes())
            .map_err(|e| StorageError::backend("Failed to read cache entry", e))?
        else {
            return Ok(None);
        };

        let entry: CachedChart = match bincode::deserialize(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Evicting undecodable cache entry");
                self.remove(key)?;
                return Ok(None);
            }
        };

        if let Some(max_age) = self.max_age {
            let age = Utc::now().signed_duration_since(entry.created_at);
            if age.to_std().map_or(false, |age| age > max_age) {
                debug!(key = %key, "Evicting expired cache entry");
                self.remove(key)?;
                return Ok(None);
            }
        }

        Ok(Some(entry))
    }

    pub fn store(&self, key: &CacheKey, value: &CachedChart) -> Result<(), StorageError> {
        let encoded = bincode::serialize(value)
            .map_err(|e| StorageError::CorruptEntry(format!("Failed to encode entry: {}", e)))?;
        self.db
            .insert(key.as_bytes(), encoded)
            .map_err(|e| StorageError::backend("Failed to write cache entry", e))?;
        self.flush()?;
        debug!(key = %key, "Cached chart result");
        Ok(())
    }

    /// Lookup by logical request fields
    pub fn get(
        &self,
        feature: &str,
        text: &str,
        options: &[(&str, Option<&str>)],
    ) -> Result<Option<CachedChart>, StorageError> {
        self.lookup(&Self::key_for(feature, text, options))
    }

    /// Store by logical request fields
    pub fn set(
        &self,
        feature: &str,
        text: &str,
        value: &CachedChart,
        options: &[(&str, Option<&str>)],
    ) -> Result<(), StorageError> {
        self.store(&Self::key_for(feature, text, options), value)
    }

    fn key_for(feature: &str, text: &str, options: &[(&str, Option<&str>)]) -> CacheKey {
        options
            .iter()
            .fold(CacheKey::new(feature, text), |key, (name, value)| {
                key.with_option(name, *value)
            })
    }

    /// Returns whether an entry was present
    pub fn remove(&self, key: &CacheKey) -> Result<bool, StorageError> {
        let removed = self
            .db
            .remove(key.as_bytes())
            .map_err(|e| StorageError::backend("Failed to remove cache entry", e))?;
        self.flush()?;
        Ok(removed.is_some())
    }

    /// Drop every entry; returns how many were removed
    pub fn clear(&self) -> Result<usize, StorageError> {
        let count = self.db.len();
        self.db
            .clear()
            .map_err(|e| StorageError::backend("Failed to clear cache", e))?;
        self.flush()?;
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| StorageError::backend("Failed to flush cache", e))?;
        Ok(())
    }
}

/// sled holds an exclusive file lock per open database
fn is_lock_conflict(err: &sled::Error) -> bool {
    match err {
        sled::Error::Io(io) => {
            io.kind() == std::io::ErrorKind::WouldBlock
                || io.to_string().contains("could not acquire lock")
        }
        _ => false,
    }
}
