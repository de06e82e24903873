//! Row schemas and rows.

use super::{LogicalType, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
}

impl ColumnMeta {
    /// Creates a new column description.
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
        }
    }
}

/// An ordered list of columns describing the shape of a row stream.
///
/// Cloning is cheap; the column list is shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowSchema {
    columns: Arc<[ColumnMeta]>,
}

impl RowSchema {
    /// Creates a schema from a list of columns.
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        Self {
            columns: columns.into(),
        }
    }

    /// Creates an empty schema.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Returns the columns.
    #[must_use]
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns whether the schema has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the column at the given position.
    #[must_use]
    pub fn column(&self, index: usize) -> Option<&ColumnMeta> {
        self.columns.get(index)
    }

    /// Finds the position of a column by name.
    ///
    /// An exact match wins; otherwise the first case-insensitive match is
    /// returned, since SQL identifiers are case-insensitive.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
            })
    }

    /// Finds a column by name.
    #[must_use]
    pub fn column_by_name(&self, name: &str) -> Option<&ColumnMeta> {
        self.index_of(name).and_then(|i| self.columns.get(i))
    }

    /// Returns the column names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Builds a schema containing only the named columns, in the given order.
    ///
    /// Returns the projected schema and the source index of every output
    /// column, or the first name that does not resolve.
    pub fn project(&self, names: &[String]) -> std::result::Result<(RowSchema, Vec<usize>), String> {
        let mut columns = Vec::with_capacity(names.len());
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let index = self.index_of(name).ok_or_else(|| name.clone())?;
            columns.push(self.columns[index].clone());
            indices.push(index);
        }
        Ok((RowSchema::new(columns), indices))
    }
}

impl Default for RowSchema {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<ColumnMeta>> for RowSchema {
    fn from(columns: Vec<ColumnMeta>) -> Self {
        Self::new(columns)
    }
}

/// One row of values, laid out in schema order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from its values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the value at the given column position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the row has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consumes the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Builds a new row from the values at the given positions.
    #[must_use]
    pub fn project(&self, indices: &[usize]) -> Row {
        Row::new(
            indices
                .iter()
                .map(|&i| self.values.get(i).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}
