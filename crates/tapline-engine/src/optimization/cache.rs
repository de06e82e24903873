//! Service cache optimization.
//!
//! Looks the full service output up before execution. A fresh entry
//! short-circuits the query; otherwise the executor is asked to record the
//! output once the run completes as a full scan.

use super::{
    Activation, ActivationContext, Optimization, OptimizationDescriptor, OptimizationKind,
    OptimizationPreview, PendingCacheWrite,
};
use crate::cache::{ServiceCache, cache_key, parse_ttl};
use std::sync::Arc;
use std::time::Duration;
use tapline_common::utils::error::{Error, Result};
use tapline_common::utils::hash::Fingerprint;

/// The service cache optimization.
pub struct ServiceCacheOptimization {
    descriptor: OptimizationDescriptor,
    cache: Arc<ServiceCache>,
}

impl ServiceCacheOptimization {
    /// Creates the optimization over a service cache.
    #[must_use]
    pub fn new(descriptor: OptimizationDescriptor, cache: Arc<ServiceCache>) -> Self {
        Self { descriptor, cache }
    }

    fn settings(&self) -> (&str, bool, Option<&str>) {
        match &self.descriptor.kind {
            OptimizationKind::ServiceCache {
                ttl,
                key_includes_params,
                cache_name,
            } => (ttl.as_str(), *key_includes_params, cache_name.as_deref()),
            _ => (crate::cache::DEFAULT_TTL, false, None),
        }
    }

    fn ttl(&self) -> Result<Duration> {
        parse_ttl(self.settings().0).map_err(|e| Error::Optimization {
            name: self.descriptor.name.clone(),
            message: e.to_string(),
        })
    }

    fn cache_name(&self, ctx: &ActivationContext<'_>) -> String {
        self.settings()
            .2
            .map_or_else(|| ctx.service.name.clone(), str::to_string)
    }

    /// Parameters taken from the WHERE clause change the service output, so
    /// they always take part in the key.
    fn key(&self, ctx: &ActivationContext<'_>) -> Result<Fingerprint> {
        let params = (self.settings().1 || !ctx.derived_params.is_empty())
            .then(|| ctx.meta.resolve_parameters(&ctx.params));
        cache_key(&ctx.meta, &self.descriptor.step_name, params.as_ref())
    }
}

impl Optimization for ServiceCacheOptimization {
    fn descriptor(&self) -> &OptimizationDescriptor {
        &self.descriptor
    }

    fn activate(&self, ctx: &mut ActivationContext<'_>) -> Result<Activation> {
        if ctx.service.streaming {
            tracing::debug!(service = %ctx.service.name, "streaming service, cache bypassed");
            return Ok(Activation::PassThrough);
        }
        let ttl = self.ttl()?;
        let cache_name = self.cache_name(ctx);
        let key = self.key(ctx)?;

        if let Some(entry) = self.cache.lookup(&cache_name, &key, ttl) {
            tracing::info!(
                service = %ctx.service.name,
                rows = entry.rows.len(),
                "serving query from cache"
            );
            return Ok(Activation::ShortCircuit(entry));
        }
        ctx.cache_write = Some(PendingCacheWrite { cache_name, key });
        Ok(Activation::PassThrough)
    }

    fn preview(&self, ctx: &mut ActivationContext<'_>) -> OptimizationPreview {
        let mut preview = OptimizationPreview::new(&self.descriptor);
        if ctx.service.streaming {
            preview.errors.push("streaming services are never cached".to_string());
            return preview;
        }
        let (ttl, key) = match (self.ttl(), self.key(ctx)) {
            (Ok(ttl), Ok(key)) => (ttl, key),
            (Err(e), _) | (_, Err(e)) => {
                preview.errors.push(e.to_string());
                return preview;
            }
        };
        let cache_name = self.cache_name(ctx);
        preview.before = format!("{cache_name}/{}", key.short());
        preview.after = match self.cache.lookup(&cache_name, &key, ttl) {
            Some(entry) => format!(
                "hit: {} rows, {}s old",
                entry.rows.len(),
                entry.age_at(chrono::Utc::now()).as_secs()
            ),
            None => "miss: result recorded after a full scan".to_string(),
        };
        preview
    }
}
