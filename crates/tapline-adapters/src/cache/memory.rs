//! In-memory cache backend.

use super::{Cache, CacheError, CacheManager, CacheTemplate, CachedResult};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tapline_common::utils::hash::Fingerprint;

/// A process-local cache.
pub struct MemoryCache {
    name: String,
    max_entries: usize,
    entries: RwLock<HashMap<Fingerprint, CachedResult>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(name: impl Into<String>, template: &CacheTemplate) -> Self {
        Self {
            name: name.into(),
            max_entries: template.max_entries,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &Fingerprint) -> Result<Option<CachedResult>, CacheError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: Fingerprint, value: CachedResult) -> Result<(), CacheError> {
        let mut entries = self.entries.write();
        entries.insert(key, value);
        if self.max_entries > 0 {
            while entries.len() > self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.created_at)
                    .map(|(key, _)| *key);
                match oldest {
                    Some(oldest) => {
                        entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        Ok(())
    }

    fn remove(&self, key: &Fingerprint) -> Result<(), CacheError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Creates [`MemoryCache`]s on demand.
#[derive(Default)]
pub struct MemoryCacheManager {
    caches: Mutex<HashMap<String, Arc<MemoryCache>>>,
}

impl MemoryCacheManager {
    /// Creates a manager with no caches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheManager for MemoryCacheManager {
    fn get_cache(&self, name: &str) -> Option<Arc<dyn Cache>> {
        self.caches
            .lock()
            .get(name)
            .map(|cache| Arc::clone(cache) as Arc<dyn Cache>)
    }

    fn create_cache(
        &self,
        template: &CacheTemplate,
        name: &str,
    ) -> Result<Arc<dyn Cache>, CacheError> {
        let mut caches = self.caches.lock();
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(cache = name, max_entries = template.max_entries, "creating cache");
                Arc::new(MemoryCache::new(name, template))
            });
        Ok(Arc::clone(cache) as Arc<dyn Cache>)
    }

    fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
