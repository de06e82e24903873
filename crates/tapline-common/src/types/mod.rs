//! Core type definitions for Tapline.
//!
//! - Value types ([`Value`], [`LogicalType`])
//! - Row types ([`Row`], [`RowSchema`], [`ColumnMeta`])

mod logical_type;
mod schema;
mod value;

pub use logical_type::LogicalType;
pub use schema::{ColumnMeta, Row, RowSchema};
pub use value::Value;
