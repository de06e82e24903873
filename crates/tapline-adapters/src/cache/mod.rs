//! Cache SPI.
//!
//! A [`CacheManager`] owns named caches; a [`Cache`] maps fingerprints to
//! materialized result sets. Entries are replaced whole, never patched, so
//! readers always see a complete row set. Expiry is the caller's concern:
//! entries carry their creation instant and callers decide what is stale.
//!
//! ## Backends
//!
//! - [`memory`] - Process-local caches

pub mod memory;

pub use memory::{MemoryCache, MemoryCacheManager};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tapline_common::types::{Row, RowSchema};
use tapline_common::utils::hash::Fingerprint;
use thiserror::Error;

/// A materialized result set.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    /// Row shape.
    pub schema: RowSchema,
    /// All rows, in emission order.
    pub rows: Arc<Vec<Row>>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl CachedResult {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(schema: RowSchema, rows: Vec<Row>) -> Self {
        Self {
            schema,
            rows: Arc::new(rows),
            created_at: Utc::now(),
        }
    }

    /// Returns the entry's age at `now`, or zero if it lies in the future.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }
}

/// Settings used when a cache has to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTemplate {
    /// Maximum number of entries; the oldest entry is evicted beyond it.
    /// Zero means unbounded.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    CacheTemplate::DEFAULT_MAX_ENTRIES
}

impl CacheTemplate {
    /// Default entry bound.
    pub const DEFAULT_MAX_ENTRIES: usize = 64;

    /// Sets the entry bound.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

impl Default for CacheTemplate {
    fn default() -> Self {
        Self {
            max_entries: Self::DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Error reported by a cache backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backend is unavailable.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    /// A cache with this name already exists with different settings.
    #[error("cache '{0}' already exists")]
    AlreadyExists(String),
}

impl From<CacheError> for tapline_common::Error {
    fn from(e: CacheError) -> Self {
        Self::Cache(e.to_string())
    }
}

/// A named cache of result sets.
pub trait Cache: Send + Sync {
    /// Returns the cache name.
    fn name(&self) -> &str;

    /// Looks up an entry.
    fn get(&self, key: &Fingerprint) -> Result<Option<CachedResult>, CacheError>;

    /// Stores an entry, replacing any previous one.
    fn put(&self, key: Fingerprint, value: CachedResult) -> Result<(), CacheError>;

    /// Removes an entry.
    fn remove(&self, key: &Fingerprint) -> Result<(), CacheError>;

    /// Returns the number of entries.
    fn len(&self) -> usize;

    /// Returns whether the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns named caches.
pub trait CacheManager: Send + Sync {
    /// Returns an existing cache.
    fn get_cache(&self, name: &str) -> Option<Arc<dyn Cache>>;

    /// Creates a cache from a template, or returns the existing one.
    fn create_cache(&self, template: &CacheTemplate, name: &str)
    -> Result<Arc<dyn Cache>, CacheError>;

    /// Returns the names of all caches.
    fn cache_names(&self) -> Vec<String>;
}
