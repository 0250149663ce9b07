//! Validation response cache.
//!
//! Responses are cached keyed by `ValidationRequest::cache_key()`. A
//! fresh entry (younger than the TTL) short-circuits validation; an
//! expired entry is still kept around because the offline fallback chain
//! may use it until the offline ceiling is reached.
//!
//! Persistence is a single JSON file (`licenses.json`) written atomically
//! (temp file, then rename) so a crash mid-write never corrupts the
//! cache.

use crate::error::{ValidationError, ValidationResult};
use chrono::{DateTime, Duration, Utc};
use keyward_types::ValidationResponse;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Default cache file name under the data directory.
pub const CACHE_FILE: &str = "licenses.json";

/// One cached validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached response.
    pub response: ValidationResponse,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Entry age at `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.stored_at
    }
}

/// In-memory cache with JSON persistence.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ValidationCache {
    entries: HashMap<String, CacheEntry>,
}

impl ValidationCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key` if it is younger than `ttl`.
    #[must_use]
    pub fn get_fresh(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Option<&CacheEntry> {
        self.entries
            .get(key)
            .filter(|entry| entry.age(now) < ttl)
    }

    /// Returns the entry for `key` regardless of age. Used by the
    /// offline fallback chain.
    #[must_use]
    pub fn get_any(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Stores a response under `key`.
    pub fn insert(&mut self, key: String, response: ValidationResponse, now: DateTime<Utc>) {
        debug!(key = %key, "caching validation response");
        self.entries.insert(
            key,
            CacheEntry {
                response,
                stored_at: now,
            },
        );
    }

    /// Removes the entry for `key`.
    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads the cache from `path`. A missing file is an empty cache,
    /// not an error.
    pub fn load(path: &Path) -> ValidationResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| ValidationError::Storage(format!("read {}: {e}", path.display())))?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Saves the cache atomically.
    pub fn save(&self, path: &Path) -> ValidationResult<()> {
        let json = serde_json::to_string(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| ValidationError::Storage(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|e| ValidationError::Storage(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }
}
