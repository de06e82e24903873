//! # tapline-engine
//!
//! The main entry point for Tapline: service resolution, push-down
//! optimizations, result caching and query execution.
//!
//! ## Modules
//!
//! - [`config`] - Configuration options
//! - [`service`] - Service definitions, catalogs and registries
//! - [`optimization`] - Parameter, cache and predicate push-down optimizations
//! - [`cache`] - Service result cache over the cache SPI
//! - [`bridge`] - Row hand-off between the service and result pipelines
//! - [`executor`] - Query execution and the streaming result API
//! - [`server`] - Wire-protocol façade over the executor

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bridge;
pub mod cache;
pub mod config;
pub mod executor;
pub mod optimization;
pub mod server;
pub mod service;

pub use config::Config;
pub use executor::{Explanation, QueryExecutor, QueryOptions, ResultStream};
pub use optimization::{
    Activation, ActivationContext, Optimization, OptimizationDescriptor, OptimizationKind,
    OptimizationPreview,
};
pub use server::Server;
pub use service::{MemoryServiceRegistry, ServiceCatalog, ServiceDefinition, ServiceRegistry};
