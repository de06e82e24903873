//! Service result cache.
//!
//! [`ServiceCache`] sits between the cache optimization and whatever
//! [`CacheManager`] is published in the provider registry. It owns the key
//! derivation and the expiry rule, and it turns every backend failure into a
//! miss or a skipped write: a broken cache slows queries down but never fails
//! them.

use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tapline_adapters::cache::{Cache, CacheManager, CacheTemplate, CachedResult};
use tapline_adapters::plugins::{CACHE_MANAGER, ProviderRegistry};
use tapline_common::utils::error::{Error, Result};
use tapline_common::utils::hash::{Fingerprint, FingerprintBuilder};
use tapline_core::execution::PipelineMeta;

/// Default time-to-live for cached results.
pub const DEFAULT_TTL: &str = "3600";

/// Parses a TTL such as `"3600"`, `"90s"`, `"15m"`, `"2h"` or `"1d"`.
///
/// A bare number is seconds.
///
/// # Errors
///
/// Returns [`Error::Config`] for empty input, an unknown unit or a number
/// that does not fit.
pub fn parse_ttl(text: &str) -> Result<Duration> {
    let s = text.trim().to_lowercase();
    let invalid = || Error::Config(format!("invalid cache TTL '{text}'"));
    if s.is_empty() {
        return Err(invalid());
    }

    let (digits, multiplier) = match s.char_indices().last() {
        Some((i, 's')) => (&s[..i], 1),
        Some((i, 'm')) => (&s[..i], 60),
        Some((i, 'h')) => (&s[..i], 3_600),
        Some((i, 'd')) => (&s[..i], 86_400),
        _ => (s.as_str(), 1),
    };
    let count: u64 = digits.trim().parse().map_err(|_| invalid())?;
    count
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// Derives the cache key for a service run.
///
/// The key covers the full pipeline definition, so editing a service
/// invalidates its entries. Parameters are sorted by name before hashing.
///
/// # Errors
///
/// Returns an error if the definition cannot be serialized.
pub fn cache_key(
    meta: &PipelineMeta,
    step: &str,
    params: Option<&IndexMap<String, String>>,
) -> Result<Fingerprint> {
    let mut builder = FingerprintBuilder::new();
    builder.update_str(&serde_json::to_string(meta)?);
    builder.update_str(step);
    if let Some(params) = params {
        let sorted: BTreeMap<&str, &str> = params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        for (name, value) in sorted {
            builder.update_str(name).update_str(value);
        }
    }
    Ok(builder.finish())
}

/// Result cache backed by a late-bound [`CacheManager`].
pub struct ServiceCache {
    providers: Arc<ProviderRegistry<dyn CacheManager>>,
    template: CacheTemplate,
    provider_timeout: Duration,
}

impl ServiceCache {
    /// Creates a cache that looks its manager up in `providers`.
    #[must_use]
    pub fn new(
        providers: Arc<ProviderRegistry<dyn CacheManager>>,
        template: CacheTemplate,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            providers,
            template,
            provider_timeout,
        }
    }

    /// Returns the provider registry.
    #[must_use]
    pub fn providers(&self) -> &Arc<ProviderRegistry<dyn CacheManager>> {
        &self.providers
    }

    fn cache(&self, name: &str) -> Option<Arc<dyn Cache>> {
        let manager = self.providers.lookup(CACHE_MANAGER, self.provider_timeout)?;
        if let Some(cache) = manager.get_cache(name) {
            return Some(cache);
        }
        match manager.create_cache(&self.template, name) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(cache = name, error = %e, "cannot create cache");
                None
            }
        }
    }

    /// Returns the entry for `key` if it is younger than `ttl`.
    ///
    /// Stale entries are removed. Backend errors count as a miss.
    pub fn lookup(&self, name: &str, key: &Fingerprint, ttl: Duration) -> Option<CachedResult> {
        let cache = self.cache(name)?;
        let entry = match cache.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(cache = name, key = %key.short(), "cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(cache = name, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let age = entry.age_at(chrono::Utc::now());
        if age >= ttl {
            tracing::debug!(
                cache = name,
                key = %key.short(),
                age_secs = age.as_secs(),
                "cache entry expired"
            );
            if let Err(e) = cache.remove(key) {
                tracing::warn!(cache = name, error = %e, "cannot remove expired entry");
            }
            return None;
        }
        tracing::debug!(cache = name, key = %key.short(), rows = entry.rows.len(), "cache hit");
        Some(entry)
    }

    /// Stores a result. Backend errors are logged and the write is skipped.
    pub fn store(&self, name: &str, key: Fingerprint, entry: CachedResult) {
        let Some(cache) = self.cache(name) else {
            return;
        };
        let rows = entry.rows.len();
        match cache.put(key, entry) {
            Ok(()) => tracing::debug!(cache = name, key = %key.short(), rows, "cached result"),
            Err(e) => tracing::warn!(cache = name, error = %e, "cache write failed"),
        }
    }
}
