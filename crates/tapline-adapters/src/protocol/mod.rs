//! Service stream wire format.
//!
//! A query result travels as one self-describing binary stream:
//!
//! ```text
//! magic "TPLN" | version u8
//! service name | service pipeline id | result pipeline id
//! column count u32 | (name, type tag u8) per column
//! (0x01 | value per column) per row
//! 0x00
//! ```
//!
//! Strings are a big-endian `u32` byte length followed by UTF-8. Each value
//! starts with its type tag (`0` for null) followed by the payload: `u8` for
//! booleans, `i64`, `f64`, a string, or an `i32` day count since 1970-01-01
//! for dates. The header, schema included, is always written, so an empty
//! result is still a valid stream.

mod reader;
mod writer;

pub use reader::ServiceStreamReader;
pub use writer::ServiceStreamWriter;

use thiserror::Error;

/// Leading bytes of every stream.
pub const MAGIC: &[u8; 4] = b"TPLN";

/// Current format version.
pub const VERSION: u8 = 1;

const ROW_MARKER: u8 = 0x01;
const END_MARKER: u8 = 0x00;
const NULL_TAG: u8 = 0x00;

/// The identifying part of a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamHeader {
    /// Service that produced the rows.
    pub service_name: String,
    /// Identifier of the service pipeline run.
    pub service_pipeline_id: String,
    /// Identifier of the result pipeline run.
    pub result_pipeline_id: String,
    /// Shape of the rows that follow.
    pub schema: tapline_common::types::RowSchema,
}

/// Error reading or writing a stream.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes do not follow the format.
    #[error("malformed stream: {0}")]
    Malformed(String),

    /// A row does not match the stream schema.
    #[error("row has {found} values, schema has {expected} columns")]
    RowWidth {
        /// Columns in the schema.
        expected: usize,
        /// Values in the row.
        found: usize,
    },
}

impl From<ProtocolError> for tapline_common::Error {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Io(io) => Self::Io(io),
            other => Self::Serialization(other.to_string()),
        }
    }
}
