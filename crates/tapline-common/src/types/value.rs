//! Typed cell values.

use super::LogicalType;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A single typed value in a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Missing value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int64(i64),
    /// Floating point value.
    Float64(f64),
    /// String value.
    String(Arc<str>),
    /// Date value.
    Date(NaiveDate),
}

impl Value {
    /// Returns the logical type of this value, or `None` for null.
    #[must_use]
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(LogicalType::Bool),
            Self::Int64(_) => Some(LogicalType::Int64),
            Self::Float64(_) => Some(LogicalType::Float64),
            Self::String(_) => Some(LogicalType::String),
            Self::Date(_) => Some(LogicalType::Date),
        }
    }

    /// Returns whether this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the boolean value, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer.
    #[must_use]
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Self::Int64(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    #[must_use]
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Self::Int64(i) => Some(*i as f64),
            Self::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the date value, if this is a date.
    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Compares two values.
    ///
    /// Integers and floats compare numerically with each other. Values of
    /// unrelated types, and nulls, are not comparable.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int64(a), Self::Int64(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Int64(_) | Self::Float64(_), Self::Int64(_) | Self::Float64(_)) => {
                self.as_float64()?.partial_cmp(&other.as_float64()?)
            }
            _ => None,
        }
    }

    /// Converts this value into a JSON value.
    ///
    /// Dates are rendered as ISO-8601 strings.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int64(i) => serde_json::Value::from(*i),
            Self::Float64(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(s.to_string()),
            Self::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
        }
    }

    /// Returns the number of days since 1970-01-01 for a date value.
    #[must_use]
    pub fn epoch_days(&self) -> Option<i32> {
        self.as_date()
            .map(|d| d.num_days_from_ce() - EPOCH_DAYS_FROM_CE)
    }

    /// Creates a date value from days since 1970-01-01.
    #[must_use]
    pub fn from_epoch_days(days: i32) -> Option<Self> {
        days.checked_add(EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(Self::Date)
    }
}

/// `NaiveDate::from_ymd(1970, 1, 1).num_days_from_ce()`.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int64(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float64(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mixed_numeric_compare() {
        assert_eq!(
            Value::Int64(2).compare(&Value::Float64(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Float64(3.0).compare(&Value::Int64(3)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_incomparable() {
        assert_eq!(Value::Null.compare(&Value::Null), None);
        assert_eq!(Value::from("1").compare(&Value::Int64(1)), None);
    }

    #[test]
    fn test_epoch_days() {
        let d = Value::Date(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap());
        assert_eq!(d.epoch_days(), Some(1));
        assert_eq!(Value::from_epoch_days(1), Some(d));
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Value::from("x").to_json(), serde_json::json!("x"));
        assert_eq!(Value::Int64(4).to_json(), serde_json::json!(4));
        let d = Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(d.to_json(), serde_json::json!("2024-03-01"));
    }

    fn numeric() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::Int64),
            (-1.0e12..1.0e12f64).prop_map(Value::Float64),
        ]
    }

    proptest! {
        #[test]
        fn prop_numeric_compare_is_antisymmetric(a in numeric(), b in numeric()) {
            prop_assert_eq!(a.compare(&b), b.compare(&a).map(Ordering::reverse));
        }
    }
}
