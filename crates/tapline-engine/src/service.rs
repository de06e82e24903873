//! Service definitions and registries.
//!
//! A service names a pipeline and the step whose rows answer queries. Service
//! catalogs are JSON documents:
//!
//! ```json
//! {
//!   "services": [
//!     {
//!       "name": "people",
//!       "step": "out",
//!       "pipeline": { "name": "people", "steps": [ ... ] },
//!       "optimizations": [
//!         { "name": "cache", "step": "out", "type": "service_cache", "ttl": "15m" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::cache::parse_ttl;
use crate::optimization::{OptimizationDescriptor, OptimizationKind, ParameterPushdown};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tapline_common::utils::error::{Error, Result};
use tapline_core::execution::{PipelineMeta, StepKind};

/// A pipeline exposed as a queryable virtual table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Name used in `FROM`.
    pub name: String,
    /// The service pipeline.
    pub pipeline: PipelineMeta,
    /// Step whose output rows form the table.
    #[serde(rename = "step")]
    pub step_name: String,
    /// Optimizations in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optimizations: Vec<OptimizationDescriptor>,
    /// Streaming services are never cached.
    #[serde(default)]
    pub streaming: bool,
}

impl ServiceDefinition {
    /// Creates a service without optimizations.
    pub fn new(name: impl Into<String>, pipeline: PipelineMeta, step_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pipeline,
            step_name: step_name.into(),
            optimizations: Vec::new(),
            streaming: false,
        }
    }

    /// Appends an optimization.
    #[must_use]
    pub fn with_optimization(mut self, optimization: OptimizationDescriptor) -> Self {
        self.optimizations.push(optimization);
        self
    }

    /// Marks the service as streaming.
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Checks the definition and returns every problem found.
    ///
    /// An empty list means the service can be queried.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let schemas = match self.pipeline.output_schemas() {
            Ok(schemas) => schemas,
            Err(e) => {
                problems.push(e.to_string());
                return problems;
            }
        };
        let Some(service_index) = self.pipeline.steps.iter().position(|s| s.name == self.step_name) else {
            problems.push(format!(
                "service step '{}' does not exist in pipeline '{}'",
                self.step_name, self.pipeline.name
            ));
            return problems;
        };
        let service_schema = &schemas[service_index];

        let mut has_params = false;
        let mut unkeyed_cache = false;
        for descriptor in &self.optimizations {
            let Some(step) = self.pipeline.find_step(&descriptor.step_name) else {
                problems.push(format!(
                    "optimization '{}' targets missing step '{}'",
                    descriptor.name, descriptor.step_name
                ));
                continue;
            };
            match &descriptor.kind {
                OptimizationKind::PredicatePushdown { .. } => {
                    if !matches!(step.kind, StepKind::Documents { .. }) {
                        problems.push(format!(
                            "optimization '{}' targets '{}', which is a {} step, not a document scan",
                            descriptor.name,
                            descriptor.step_name,
                            step.kind.label()
                        ));
                    }
                }
                OptimizationKind::ServiceCache {
                    ttl,
                    key_includes_params,
                    ..
                } => {
                    if let Err(e) = parse_ttl(ttl) {
                        problems.push(format!("optimization '{}': {e}", descriptor.name));
                    }
                    if descriptor.enabled && !self.streaming && !key_includes_params {
                        unkeyed_cache = true;
                    }
                }
                OptimizationKind::ParameterPushdown { definitions } => {
                    let valid = ParameterPushdown::new(descriptor.clone()).mappings().len();
                    if valid < definitions.len() {
                        problems.push(format!(
                            "optimization '{}' has {} invalid parameter mappings",
                            descriptor.name,
                            definitions.len() - valid
                        ));
                    }
                    for mapping in definitions {
                        if !mapping.column.trim().is_empty()
                            && service_schema.index_of(&mapping.column).is_none()
                        {
                            problems.push(format!(
                                "optimization '{}' maps unknown column '{}'",
                                descriptor.name, mapping.column
                            ));
                        }
                    }
                    has_params |= descriptor.enabled && !definitions.is_empty();
                }
            }
        }
        if has_params && unkeyed_cache {
            problems.push(
                "service cache must set key_includes_params when parameters are pushed down"
                    .to_string(),
            );
        }
        problems
    }
}

/// Looks services up by name.
pub trait ServiceRegistry: Send + Sync {
    /// Returns the service with the given name.
    fn get(&self, name: &str) -> Option<Arc<ServiceDefinition>>;

    /// Returns all service names in registration order.
    fn names(&self) -> Vec<String>;
}

/// A JSON service catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceCatalog {
    /// The services.
    pub services: Vec<ServiceDefinition>,
}

impl ServiceCatalog {
    /// Parses a catalog.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the text is not a valid catalog.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a catalog file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), services = catalog.services.len(), "loaded service catalog");
        Ok(catalog)
    }

    /// Checks every service, prefixing problems with the service name.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (i, service) in self.services.iter().enumerate() {
            if self.services[..i]
                .iter()
                .any(|s| s.name.eq_ignore_ascii_case(&service.name))
            {
                problems.push(format!("{}: duplicate service name", service.name));
            }
            problems.extend(
                service
                    .validate()
                    .into_iter()
                    .map(|p| format!("{}: {p}", service.name)),
            );
        }
        problems
    }
}

/// An in-memory [`ServiceRegistry`].
///
/// Lookups try the exact name first, then a case-insensitive match, the way
/// SQL treats unquoted identifiers.
#[derive(Default)]
pub struct MemoryServiceRegistry {
    services: RwLock<IndexMap<String, Arc<ServiceDefinition>>>,
}

impl MemoryServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every service of a catalog.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if two services share a name.
    pub fn from_catalog(catalog: ServiceCatalog) -> Result<Self> {
        let registry = Self::new();
        for service in catalog.services {
            let name = service.name.clone();
            if registry.register(service).is_some() {
                return Err(Error::Config(format!("duplicate service name '{name}'")));
            }
        }
        Ok(registry)
    }

    /// Loads a registry from a catalog file.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or repeats a name.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_catalog(ServiceCatalog::load(path)?)
    }

    /// Registers a service, returning the one it replaced.
    pub fn register(&self, service: ServiceDefinition) -> Option<Arc<ServiceDefinition>> {
        tracing::debug!(service = %service.name, "registered service");
        self.services
            .write()
            .insert(service.name.clone(), Arc::new(service))
    }

    /// Removes a service.
    pub fn remove(&self, name: &str) -> Option<Arc<ServiceDefinition>> {
        self.services.write().shift_remove(name)
    }

    /// Returns the number of services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ServiceRegistry for MemoryServiceRegistry {
    fn get(&self, name: &str) -> Option<Arc<ServiceDefinition>> {
        let services = self.services.read();
        services
            .get(name)
            .or_else(|| {
                services
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .cloned()
    }

    fn names(&self) -> Vec<String> {
        self.services.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::ParameterMapping;
    use serde_json::json;
    use std::io::Write;
    use tapline_common::types::LogicalType;
    use tapline_core::execution::DocumentField;

    fn people() -> ServiceDefinition {
        let meta = PipelineMeta::new("people")
            .with_step(
                "scan",
                StepKind::Documents {
                    fields: vec![
                        DocumentField::new("name", LogicalType::String),
                        DocumentField::new("city", LogicalType::String),
                    ],
                    documents: vec![json!({"name": "Ann", "city": "Oslo"})],
                    query: None,
                },
            )
            .with_step("out", StepKind::Select { columns: Vec::new() });
        ServiceDefinition::new("People", meta, "out")
    }

    fn catalog_json() -> serde_json::Value {
        json!({
            "services": [{
                "name": "numbers",
                "step": "seq",
                "pipeline": {
                    "name": "numbers",
                    "steps": [{"name": "seq", "kind": "sequence", "column": "n", "count": 3}]
                },
                "optimizations": [
                    {"name": "cache", "step": "seq", "type": "service_cache", "ttl": "90s"}
                ]
            }]
        })
    }

    #[test]
    fn test_valid_service() {
        assert!(people().validate().is_empty());
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut service = people();
        service.step_name = "missing".to_string();
        assert_eq!(service.validate().len(), 1);

        let service = people()
            .with_optimization(OptimizationDescriptor::new(
                "push",
                "out",
                OptimizationKind::PredicatePushdown {
                    field_mapping: None,
                    required: false,
                },
            ))
            .with_optimization(OptimizationDescriptor::new(
                "cache",
                "nowhere",
                OptimizationKind::ServiceCache {
                    ttl: "1h".to_string(),
                    key_includes_params: false,
                    cache_name: None,
                },
            ));
        let problems = service.validate();
        assert_eq!(problems.len(), 2, "{problems:?}");
        assert!(problems[0].contains("not a document scan"));
        assert!(problems[1].contains("missing step 'nowhere'"));
    }

    #[test]
    fn test_validate_parameter_mappings() {
        let service = people()
            .with_optimization(OptimizationDescriptor::new(
                "params",
                "scan",
                OptimizationKind::ParameterPushdown {
                    definitions: vec![
                        ParameterMapping::for_column("city"),
                        ParameterMapping::for_column("zip"),
                        ParameterMapping::for_column("name").with_parameter(""),
                    ],
                },
            ))
            .with_optimization(OptimizationDescriptor::new(
                "cache",
                "out",
                OptimizationKind::ServiceCache {
                    ttl: "later".to_string(),
                    key_includes_params: false,
                    cache_name: None,
                },
            ));
        let problems = service.validate();
        assert!(problems.iter().any(|p| p.contains("1 invalid parameter mappings")));
        assert!(problems.iter().any(|p| p.contains("unknown column 'zip'")));
        assert!(problems.iter().any(|p| p.contains("invalid cache TTL")));
        assert!(problems.iter().any(|p| p.contains("key_includes_params")));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = MemoryServiceRegistry::new();
        registry.register(people());
        assert!(registry.get("People").is_some());
        assert!(registry.get("people").is_some());
        assert!(registry.get("nobody").is_none());
        assert_eq!(registry.names(), vec!["People".to_string()]);
        assert!(registry.remove("People").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_catalog_roundtrip_through_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", catalog_json()).unwrap();

        let catalog = ServiceCatalog::load(file.path()).unwrap();
        assert!(catalog.validate().is_empty());
        let service = &catalog.services[0];
        assert_eq!(service.step_name, "seq");
        assert!(!service.streaming);
        assert!(service.optimizations[0].enabled);

        let registry = MemoryServiceRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let catalog = ServiceCatalog {
            services: vec![people(), people()],
        };
        assert!(catalog.validate().iter().any(|p| p.contains("duplicate")));
        assert!(matches!(
            MemoryServiceRegistry::from_catalog(catalog),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_catalog_parse_error() {
        assert!(matches!(
            ServiceCatalog::from_json(r#"{"services": [{"name": 1}]}"#),
            Err(Error::Serialization(_))
        ));
    }
}
