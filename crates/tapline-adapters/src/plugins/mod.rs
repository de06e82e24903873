//! Plugin plumbing for Tapline.
//!
//! Providers such as cache managers register late, often after the engine
//! is constructed. The [`ProviderRegistry`] lets consumers wait a bounded
//! time for a provider instead of failing at startup.

mod registry;

pub use registry::ProviderRegistry;

/// Registry id under which the cache manager is published.
pub const CACHE_MANAGER: &str = "cache-manager";
