//! Query language parsers.
//!
//! ## Supported Languages
//!
//! - SQL: `SELECT ... FROM <service> [WHERE ...] [LIMIT n]`

#[cfg(feature = "sql")]
pub mod sql;
