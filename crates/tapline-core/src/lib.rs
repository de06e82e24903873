//! # tapline-core
//!
//! Core layer for Tapline: predicates, their translation, and the pipeline
//! engine that produces rows.
//!
//! This crate depends only on `tapline-common`.
//!
//! ## Modules
//!
//! - [`condition`] - Condition trees, value resolution and row evaluation
//! - [`predicate`] - Translation of condition trees into native query languages
//! - [`execution`] - Pipeline definitions, steps, row listeners and the local engine

pub mod condition;
pub mod execution;
pub mod predicate;

// Re-export commonly used types
pub use condition::{Atom, Compound, Condition, Connector, Operand, Operator};
pub use execution::{
    Pipeline, PipelineFactory, PipelineMeta, RowInput, StepHandle, StepKind, StepMeta, StepOutcome,
};
pub use predicate::{DocumentDialect, PredicateTranslator, TargetDialect};
