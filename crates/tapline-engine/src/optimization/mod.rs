//! Push-down optimizations.
//!
//! A service lists the optimizations that may rewrite or short-circuit its
//! execution. Each is declared by an [`OptimizationDescriptor`] and runs
//! through the [`Optimization`] capability trait:
//!
//! - `init` runs once per pipeline build and may edit the definition
//!   (for example to declare parameters).
//! - `activate` runs once per query and either lets execution through,
//!   reports that it rewrote the pipeline, or short-circuits with a
//!   cached result.
//! - `preview` reports what `activate` would do without reading rows.
//!
//! Optimizations run in ascending [`priority`](OptimizationKind::priority)
//! order; ties keep declaration order.
//!
//! ## Variants
//!
//! - [`parameter`] - Derives pipeline parameters from the WHERE clause
//! - [`cache`] - Serves and records full result sets
//! - [`predicate`] - Translates the WHERE clause into a document filter

pub mod cache;
pub mod parameter;
pub mod predicate;

pub use cache::ServiceCacheOptimization;
pub use parameter::{ParameterMapping, ParameterPushdown};
pub use predicate::PredicatePushdown;

use crate::cache::ServiceCache;
use crate::service::ServiceDefinition;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tapline_adapters::cache::CachedResult;
use tapline_adapters::query::sql::SqlQuery;
use tapline_common::utils::error::Result;
use tapline_common::utils::hash::Fingerprint;
use tapline_core::execution::PipelineMeta;

fn enabled_by_default() -> bool {
    true
}

/// A configured optimization of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationDescriptor {
    /// Name shown in logs and previews.
    pub name: String,
    /// Pipeline step the optimization targets.
    #[serde(rename = "step")]
    pub step_name: String,
    /// Disabled optimizations are skipped entirely.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Variant-specific settings.
    #[serde(flatten)]
    pub kind: OptimizationKind,
}

impl OptimizationDescriptor {
    /// Creates an enabled descriptor.
    pub fn new(name: impl Into<String>, step_name: impl Into<String>, kind: OptimizationKind) -> Self {
        Self {
            name: name.into(),
            step_name: step_name.into(),
            enabled: true,
            kind,
        }
    }

    /// Enables or disables the optimization.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// The optimization variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizationKind {
    /// Sets pipeline parameters from equality predicates.
    ParameterPushdown {
        /// Column to parameter mappings.
        #[serde(default)]
        definitions: Vec<ParameterMapping>,
    },
    /// Serves repeated queries from a result cache.
    ServiceCache {
        /// Entry lifetime, e.g. `"3600"` or `"15m"`.
        #[serde(default = "default_ttl")]
        ttl: String,
        /// Whether parameter values are part of the cache key.
        #[serde(default)]
        key_includes_params: bool,
        /// Cache name; defaults to the service name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_name: Option<String>,
    },
    /// Pushes the WHERE clause into a document scan.
    PredicatePushdown {
        /// Service column to document field path.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field_mapping: Option<IndexMap<String, String>>,
        /// Fail the query when the predicate cannot be pushed down.
        #[serde(default)]
        required: bool,
    },
}

fn default_ttl() -> String {
    crate::cache::DEFAULT_TTL.to_string()
}

impl OptimizationKind {
    /// Returns the activation priority; lower runs first.
    ///
    /// Parameters are derived before the cache key is computed, and the
    /// cache is consulted before anything rewrites the pipeline.
    #[must_use]
    pub fn priority(&self) -> u32 {
        match self {
            Self::ParameterPushdown { .. } => 0,
            Self::ServiceCache { .. } => 10,
            Self::PredicatePushdown { .. } => 20,
        }
    }

    /// Returns the variant name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ParameterPushdown { .. } => "parameter_pushdown",
            Self::ServiceCache { .. } => "service_cache",
            Self::PredicatePushdown { .. } => "predicate_pushdown",
        }
    }
}

/// What an activation decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    /// Execution proceeds unchanged.
    PassThrough,
    /// The pipeline definition was rewritten; the run is no longer a full scan.
    Modified,
    /// Execution is skipped and the cached result is replayed.
    ShortCircuit(CachedResult),
}

/// A cache write scheduled for after a full run.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCacheWrite {
    /// Target cache.
    pub cache_name: String,
    /// Entry key.
    pub key: Fingerprint,
}

/// Per-query state shared by the activations of one query.
pub struct ActivationContext<'a> {
    /// The resolved service.
    pub service: &'a ServiceDefinition,
    /// The parsed query.
    pub query: &'a SqlQuery,
    /// Working copy of the service pipeline definition.
    pub meta: PipelineMeta,
    /// Parameter values; starts with the caller's values.
    pub params: IndexMap<String, String>,
    /// Names of the parameters filled in from the WHERE clause.
    pub derived_params: Vec<String>,
    /// Cache write to perform if the run turns out to be a full scan.
    pub cache_write: Option<PendingCacheWrite>,
}

impl<'a> ActivationContext<'a> {
    /// Creates a context over an initialized pipeline definition.
    pub fn new(
        service: &'a ServiceDefinition,
        query: &'a SqlQuery,
        meta: PipelineMeta,
        params: IndexMap<String, String>,
    ) -> Self {
        Self {
            service,
            query,
            meta,
            params,
            derived_params: Vec::new(),
            cache_write: None,
        }
    }
}

/// What an optimization would do for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizationPreview {
    /// Optimization name.
    pub name: String,
    /// Targeted step.
    pub step: String,
    /// The affected setting before activation.
    pub before: String,
    /// The affected setting after activation.
    pub after: String,
    /// Problems that would prevent the optimization from applying.
    pub errors: Vec<String>,
}

impl OptimizationPreview {
    fn new(descriptor: &OptimizationDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            step: descriptor.step_name.clone(),
            before: String::new(),
            after: String::new(),
            errors: Vec::new(),
        }
    }

    /// Returns whether activation would change anything.
    #[must_use]
    pub fn changes(&self) -> bool {
        self.errors.is_empty() && self.before != self.after
    }
}

/// The capability every optimization variant implements.
pub trait Optimization: Send + Sync {
    /// Returns the descriptor the optimization was built from.
    fn descriptor(&self) -> &OptimizationDescriptor;

    /// Returns the optimization name.
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Returns the activation priority.
    fn priority(&self) -> u32 {
        self.descriptor().kind.priority()
    }

    /// Prepares the pipeline definition before it is built.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition cannot host the optimization.
    fn init(&self, meta: &mut PipelineMeta) -> Result<()> {
        let _ = meta;
        Ok(())
    }

    /// Decides how the current query executes.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the query before any row streams.
    fn activate(&self, ctx: &mut ActivationContext<'_>) -> Result<Activation>;

    /// Reports what [`activate`](Self::activate) would do.
    ///
    /// Rewrites are applied to `ctx` so later previews see them, but no
    /// result is short-circuited and nothing is written.
    fn preview(&self, ctx: &mut ActivationContext<'_>) -> OptimizationPreview;
}

/// Builds the enabled optimizations of a service in activation order.
#[must_use]
pub fn build_optimizations(
    descriptors: &[OptimizationDescriptor],
    cache: &Arc<ServiceCache>,
) -> Vec<Box<dyn Optimization>> {
    let mut optimizations: Vec<Box<dyn Optimization>> = descriptors
        .iter()
        .filter(|d| d.enabled)
        .map(|descriptor| -> Box<dyn Optimization> {
            match &descriptor.kind {
                OptimizationKind::ParameterPushdown { .. } => {
                    Box::new(ParameterPushdown::new(descriptor.clone()))
                }
                OptimizationKind::ServiceCache { .. } => {
                    Box::new(ServiceCacheOptimization::new(descriptor.clone(), Arc::clone(cache)))
                }
                OptimizationKind::PredicatePushdown { .. } => {
                    Box::new(PredicatePushdown::new(descriptor.clone()))
                }
            }
        })
        .collect();
    // Stable sort keeps declaration order among equal priorities.
    optimizations.sort_by_key(|o| o.priority());
    optimizations
}
