//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tapline_adapters::cache::CacheTemplate;
use tapline_common::utils::error::{Error, Result};

/// Engine configuration.
///
/// A `Config` is handed to the [`QueryExecutor`](crate::QueryExecutor) when
/// it is created; individual queries may tighten or relax the limits through
/// [`QueryOptions`](crate::QueryOptions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum rows handed from a service to its result; 0 disables the cutoff.
    pub row_limit: u64,

    /// Wall-clock budget per query in milliseconds; 0 disables it.
    pub time_limit_ms: u64,

    /// How long one hand-off attempt waits for room in the result queue.
    pub offer_timeout_ms: u64,

    /// Capacity of the result pipeline's input queue.
    pub queue_capacity: usize,

    /// Rows buffered between the result pipeline and the reader.
    pub result_buffer: usize,

    /// Template for caches created on demand.
    pub cache_template: CacheTemplate,

    /// How long to wait for a cache provider to register.
    pub provider_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            row_limit: 50_000,
            time_limit_ms: 100_000,
            offer_timeout_ms: 1_000,
            queue_capacity: 1_000,
            result_buffer: 256,
            cache_template: CacheTemplate::default(),
            provider_timeout_ms: 2_000,
        }
    }
}

impl Config {
    /// Sets the row cutoff. Zero means unlimited.
    #[must_use]
    pub fn with_row_limit(mut self, rows: u64) -> Self {
        self.row_limit = rows;
        self
    }

    /// Sets the time limit. A zero duration means unlimited.
    #[must_use]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit_ms = limit.as_millis() as u64;
        self
    }

    /// Sets the per-attempt hand-off timeout.
    #[must_use]
    pub fn with_offer_timeout(mut self, timeout: Duration) -> Self {
        self.offer_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the result input queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the reader-side buffer size.
    #[must_use]
    pub fn with_result_buffer(mut self, rows: usize) -> Self {
        self.result_buffer = rows;
        self
    }

    /// Sets the template for caches created on demand.
    #[must_use]
    pub fn with_cache_template(mut self, template: CacheTemplate) -> Self {
        self.cache_template = template;
        self
    }

    /// Sets how long cache lookups wait for a provider.
    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Returns the time limit, or `None` if unlimited.
    #[must_use]
    pub fn time_limit(&self) -> Option<Duration> {
        (self.time_limit_ms > 0).then(|| Duration::from_millis(self.time_limit_ms))
    }

    /// Returns the per-attempt hand-off timeout.
    #[must_use]
    pub fn offer_timeout(&self) -> Duration {
        Duration::from_millis(self.offer_timeout_ms)
    }

    /// Returns the provider wait timeout.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Checks that the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero queue capacity, result buffer or
    /// offer timeout.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.result_buffer == 0 {
            return Err(Error::Config("result_buffer must be at least 1".to_string()));
        }
        if self.offer_timeout_ms == 0 {
            return Err(Error::Config("offer_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Loads a configuration from a JSON file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.as_ref().display())))?;
        config.validate()?;
        Ok(config)
    }
}
