//! # tapline-common
//!
//! Foundation layer for Tapline: values, schemas, errors and hashing.
//!
//! This crate provides the building blocks shared by every other Tapline
//! crate. It has no internal dependencies and should be kept minimal.
//!
//! ## Modules
//!
//! - [`types`] - Core type definitions (Value, LogicalType, RowSchema, Row)
//! - [`utils`] - Utility functions and helpers (errors, fingerprints)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod types;
pub mod utils;

// Re-export commonly used types at crate root
pub use types::{ColumnMeta, LogicalType, Row, RowSchema, Value};
pub use utils::error::{Error, Result};
