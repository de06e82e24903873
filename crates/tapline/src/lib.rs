//! # Tapline
//!
//! Query transformation pipelines with SQL.
//!
//! A [`ServiceDefinition`] exposes one step of a pipeline as a virtual table.
//! [`QueryExecutor`] parses `SELECT ... FROM <service> [WHERE ...] [LIMIT n]`,
//! runs the service pipeline, and streams the matching rows back while the
//! service is still producing them. Optimizations declared on a service can
//! derive pipeline parameters from the WHERE clause, serve repeated scans
//! from a cache, or push the predicate into a document scan.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tapline::{
//!     Config, MemoryServiceRegistry, PipelineMeta, QueryExecutor, ServiceDefinition, StepKind,
//! };
//!
//! let pipeline = PipelineMeta::new("numbers").with_step(
//!     "seq",
//!     StepKind::Sequence { column: "n".to_string(), start: 1, count: Some(10) },
//! );
//! let registry = MemoryServiceRegistry::new();
//! registry.register(ServiceDefinition::new("numbers", pipeline, "seq"));
//!
//! let executor = QueryExecutor::new(Config::default(), Arc::new(registry));
//! let rows = executor
//!     .execute("SELECT n FROM numbers WHERE n > 7", 0)?
//!     .collect_rows()?;
//! assert_eq!(rows.len(), 3);
//! # Ok::<(), tapline::Error>(())
//! ```

// Query execution
pub use tapline_engine::{
    Config, Explanation, MemoryServiceRegistry, QueryExecutor, QueryOptions, ResultStream, Server,
    ServiceCatalog, ServiceDefinition, ServiceRegistry,
};

// Optimizations
pub use tapline_engine::{
    Activation, ActivationContext, Optimization, OptimizationDescriptor, OptimizationKind,
    OptimizationPreview,
};

// Pipelines and conditions
pub use tapline_core::condition::{Condition, Connector, Operator};
pub use tapline_core::execution::{PipelineMeta, StepKind};

// Values, rows and errors
pub use tapline_common::types::{ColumnMeta, LogicalType, Row, RowSchema, Value};
pub use tapline_common::utils::error::{Error, Result};

// Wire format, for clients reading a result stream
pub use tapline_adapters::protocol::{ServiceStreamReader, ServiceStreamWriter, StreamHeader};
