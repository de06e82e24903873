//! Late-bound provider lookup.

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Slot<T: ?Sized> {
    provider: Mutex<Option<Arc<T>>>,
    ready: Condvar,
}

impl<T: ?Sized> Slot<T> {
    fn new() -> Self {
        Self {
            provider: Mutex::new(None),
            ready: Condvar::new(),
        }
    }
}

/// Providers keyed by id, each published at most once.
///
/// Registering wakes every waiting [`lookup`](Self::lookup). Re-registering
/// an id replaces the provider for later lookups.
pub struct ProviderRegistry<T: ?Sized> {
    slots: Mutex<HashMap<String, Arc<Slot<T>>>>,
}

impl<T: ?Sized> Default for ProviderRegistry<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: ?Sized> ProviderRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &str) -> Arc<Slot<T>> {
        let mut slots = self.slots.lock();
        Arc::clone(
            slots
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    /// Publishes a provider and wakes waiting lookups.
    pub fn register(&self, id: &str, provider: Arc<T>) {
        let slot = self.slot(id);
        let mut guard = slot.provider.lock();
        if guard.is_some() {
            tracing::debug!(provider = id, "replacing registered provider");
        }
        *guard = Some(provider);
        slot.ready.notify_all();
    }

    /// Returns the provider if it is already registered.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        let slot = self.slots.lock().get(id).cloned()?;
        let guard = slot.provider.lock();
        guard.clone()
    }

    /// Waits up to `timeout` for a provider.
    ///
    /// Returns `None` and logs a warning if nothing registers in time.
    pub fn lookup(&self, id: &str, timeout: Duration) -> Option<Arc<T>> {
        let slot = self.slot(id);
        let deadline = Instant::now() + timeout;
        let mut guard = slot.provider.lock();
        while guard.is_none() {
            if slot.ready.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        let found = guard.clone();
        if found.is_none() {
            tracing::warn!(
                provider = id,
                timeout_ms = timeout.as_millis() as u64,
                "provider not registered in time"
            );
        }
        found
    }

    /// Returns whether a provider is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Fixed(&'static str);

    impl Named for Fixed {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_lookup_registered() {
        let registry: ProviderRegistry<dyn Named> = ProviderRegistry::new();
        registry.register("a", Arc::new(Fixed("first")));
        let found = registry.lookup("a", Duration::from_millis(1)).unwrap();
        assert_eq!(found.name(), "first");
        assert!(registry.contains("a"));
        assert!(!registry.contains("b"));
    }

    #[test]
    fn test_lookup_times_out() {
        let registry: ProviderRegistry<dyn Named> = ProviderRegistry::new();
        let start = Instant::now();
        assert!(registry.lookup("missing", Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_late_registration_wakes_waiter() {
        let registry: Arc<ProviderRegistry<dyn Named>> = Arc::new(ProviderRegistry::new());
        let waiter = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                registry
                    .lookup("late", Duration::from_secs(5))
                    .map(|p| p.name().to_string())
            })
        };
        thread::sleep(Duration::from_millis(20));
        registry.register("late", Arc::new(Fixed("arrived")));
        assert_eq!(waiter.join().unwrap().as_deref(), Some("arrived"));
    }

    #[test]
    fn test_reregister_replaces() {
        let registry: ProviderRegistry<dyn Named> = ProviderRegistry::new();
        registry.register("a", Arc::new(Fixed("one")));
        registry.register("a", Arc::new(Fixed("two")));
        assert_eq!(registry.get("a").unwrap().name(), "two");
    }
}
