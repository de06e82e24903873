//! Logical column types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of a pipeline column.
///
/// Every column of a [`RowSchema`](super::RowSchema) carries one of these.
/// Literal values in query predicates are coerced to the column's type
/// before they are compared or translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    /// Boolean.
    Bool,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Calendar date without time zone.
    Date,
}

impl LogicalType {
    /// Returns the lowercase type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::String => "string",
            Self::Date => "date",
        }
    }

    /// Returns whether values of this type compare numerically.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }

    /// Returns the wire tag used by the streaming protocol.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Self::Bool => 1,
            Self::Int64 => 2,
            Self::Float64 => 3,
            Self::String => 4,
            Self::Date => 5,
        }
    }

    /// Looks up a type by its wire tag.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Bool),
            2 => Some(Self::Int64),
            3 => Some(Self::Float64),
            4 => Some(Self::String),
            5 => Some(Self::Date),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
