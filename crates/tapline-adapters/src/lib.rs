//! # tapline-adapters
//!
//! Adapters layer for Tapline: the SQL front end, the service stream wire
//! format, cache storage and the provider registry that binds cache
//! backends at runtime.
//!
//! ## Modules
//!
//! - [`query`] - Query language parsers (SQL)
//! - [`protocol`] - Binary encoding of service result streams
//! - [`cache`] - Cache SPI and the in-memory backend
//! - [`plugins`] - Provider registry

#![warn(missing_docs)]

pub mod cache;
pub mod plugins;
pub mod protocol;
pub mod query;
