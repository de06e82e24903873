//! Value resolution.
//!
//! Literals in a condition arrive in whatever shape the parser produced:
//! a quoted string, an integer, a delimited `IN` list. Before a literal can be
//! compared with a column or handed to a native query language it is coerced
//! to the column's [`LogicalType`].

use chrono::NaiveDate;
use tapline_common::types::{LogicalType, RowSchema, Value};
use tapline_common::utils::error::{Error, QueryError, QueryErrorKind, Result};

/// Delimiter between `IN` list items.
pub const LIST_DELIMITER: char = ';';

/// Escape character inside delimited lists.
pub const LIST_ESCAPE: char = '\\';

/// Converts condition literals into the native types of their columns.
pub trait ValueResolver: Send + Sync {
    /// Returns the type of a column, or `None` if the column is unknown.
    fn column_type(&self, column: &str) -> Option<LogicalType>;

    /// Coerces a single literal to the type of `column`.
    fn resolve(&self, column: &str, value: &Value) -> Result<Value> {
        let ty = self.column_type(column).ok_or_else(|| unknown_column(column))?;
        coerce(value, ty)
    }

    /// Splits a delimited list and coerces every item to the type of `column`.
    fn resolve_list(&self, column: &str, delimited: &str) -> Result<Vec<Value>> {
        let ty = self.column_type(column).ok_or_else(|| unknown_column(column))?;
        split_delimited(delimited)
            .into_iter()
            .map(|item| coerce(&Value::from(item), ty))
            .collect()
    }
}

/// Resolves column types from a row schema.
#[derive(Debug, Clone)]
pub struct SchemaResolver {
    schema: RowSchema,
}

impl SchemaResolver {
    /// Creates a resolver over the given schema.
    #[must_use]
    pub fn new(schema: RowSchema) -> Self {
        Self { schema }
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &RowSchema {
        &self.schema
    }
}

impl ValueResolver for SchemaResolver {
    fn column_type(&self, column: &str) -> Option<LogicalType> {
        self.schema.column_by_name(column).map(|c| c.logical_type)
    }
}

fn unknown_column(column: &str) -> Error {
    Error::Query(QueryError::new(
        QueryErrorKind::Semantic,
        format!("unknown column '{column}'"),
    ))
}

/// Coerces a value to the given type.
///
/// Nulls stay null. Strings are parsed, integers widen to floats, and any
/// value renders to text for string columns.
pub fn coerce(value: &Value, ty: LogicalType) -> Result<Value> {
    if value.is_null() || value.logical_type() == Some(ty) {
        return Ok(value.clone());
    }
    match (ty, value) {
        (LogicalType::String, v) => Ok(Value::from(v.to_string())),
        (LogicalType::Float64, Value::Int64(i)) => Ok(Value::Float64(*i as f64)),
        (LogicalType::Int64, Value::Float64(f)) => {
            if f.fract() == 0.0 && f.is_finite() {
                Ok(Value::Int64(*f as i64))
            } else {
                Err(Error::row_conversion(f, ty, "value has a fractional part"))
            }
        }
        (_, Value::String(s)) => parse_str(s, ty),
        (_, v) => Err(Error::row_conversion(
            v,
            ty,
            format!("{} values cannot be converted", v.logical_type().map_or("null", |t| t.name())),
        )),
    }
}

/// Parses text into a value of the given type.
pub fn parse_str(s: &str, ty: LogicalType) -> Result<Value> {
    let trimmed = s.trim();
    match ty {
        LogicalType::String => Ok(Value::from(s)),
        LogicalType::Int64 => trimmed
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|e| Error::row_conversion(s, ty, e.to_string())),
        LogicalType::Float64 => trimmed
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|e| Error::row_conversion(s, ty, e.to_string())),
        LogicalType::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
            "false" | "f" | "no" | "n" | "0" => Ok(Value::Bool(false)),
            _ => Err(Error::row_conversion(s, ty, "not a boolean")),
        },
        LogicalType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y/%m/%d"))
            .map(Value::Date)
            .map_err(|e| Error::row_conversion(s, ty, e.to_string())),
    }
}

/// Converts a JSON value into a value of the given type.
///
/// Used when rows or documents are defined in JSON.
pub fn coerce_json(json: &serde_json::Value, ty: LogicalType) -> Result<Value> {
    let value = match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => Value::Float64(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::from(s.as_str()),
        other => {
            return Err(Error::row_conversion(
                other,
                ty,
                "nested JSON values cannot be converted",
            ));
        }
    };
    coerce(&value, ty)
}

/// Splits a `;`-delimited list, honoring `\;` and `\\` escapes.
///
/// An escape before any other character is kept literally.
#[must_use]
pub fn split_delimited(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            LIST_ESCAPE => match chars.peek() {
                Some(&next) if next == LIST_DELIMITER || next == LIST_ESCAPE => {
                    current.push(next);
                    chars.next();
                }
                _ => current.push(c),
            },
            LIST_DELIMITER => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);
    items
}

/// Joins items into a `;`-delimited list, escaping delimiters and escapes.
pub fn join_delimited<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let escaped: Vec<String> = items
        .into_iter()
        .map(|item| {
            item.as_ref()
                .replace(LIST_ESCAPE, "\\\\")
                .replace(LIST_DELIMITER, "\\;")
        })
        .collect();
    escaped.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tapline_common::types::ColumnMeta;

    fn resolver() -> SchemaResolver {
        SchemaResolver::new(RowSchema::new(vec![
            ColumnMeta::new("sField1", LogicalType::String),
            ColumnMeta::new("iField", LogicalType::Int64),
            ColumnMeta::new("nField", LogicalType::Float64),
            ColumnMeta::new("bField", LogicalType::Bool),
            ColumnMeta::new("dField", LogicalType::Date),
        ]))
    }

    #[test]
    fn test_escaped_delimiter_in_list() {
        let values = resolver().resolve_list("sField1", "f\\;oo;bar;baz").unwrap();
        assert_eq!(
            values,
            vec![Value::from("f;oo"), Value::from("bar"), Value::from("baz")]
        );
    }

    #[test]
    fn test_typed_list() {
        let values = resolver().resolve_list("iField", "1;2; 3").unwrap();
        assert_eq!(values, vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);
    }

    #[test]
    fn test_resolve_scalars() {
        let r = resolver();
        assert_eq!(r.resolve("iField", &Value::from("42")).unwrap(), Value::Int64(42));
        assert_eq!(r.resolve("nField", &Value::Int64(2)).unwrap(), Value::Float64(2.0));
        assert_eq!(r.resolve("bField", &Value::from("Y")).unwrap(), Value::Bool(true));
        assert_eq!(r.resolve("sField1", &Value::Int64(7)).unwrap(), Value::from("7"));
        assert_eq!(
            r.resolve("dField", &Value::from("2024-02-29")).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
    }

    #[test]
    fn test_conversion_failure() {
        let err = resolver().resolve("iField", &Value::from("abc")).unwrap_err();
        assert!(matches!(err, Error::RowConversion { target: LogicalType::Int64, .. }));
    }

    #[test]
    fn test_unknown_column() {
        let err = resolver().resolve("nope", &Value::Int64(1)).unwrap_err();
        assert!(matches!(err, Error::Query(_)));
    }

    #[test]
    fn test_lone_escape_kept() {
        assert_eq!(split_delimited("a\\b;c"), vec!["a\\b", "c"]);
        assert_eq!(split_delimited(""), vec![""]);
    }

    #[test]
    fn test_coerce_json() {
        assert_eq!(
            coerce_json(&serde_json::json!(3), LogicalType::Float64).unwrap(),
            Value::Float64(3.0)
        );
        assert!(coerce_json(&serde_json::json!([1]), LogicalType::String).is_err());
    }

    proptest! {
        #[test]
        fn prop_join_split_roundtrip(items in proptest::collection::vec("[a-z;\\\\]{0,6}", 1..6)) {
            let joined = join_delimited(&items);
            prop_assert_eq!(split_delimited(&joined), items);
        }
    }
}
