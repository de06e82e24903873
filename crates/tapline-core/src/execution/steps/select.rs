//! Column projection.

use super::{RowTransform, StepFlow};
use crate::execution::PipelineError;
use tapline_common::types::{Row, RowSchema};

/// Keeps the selected columns, in selection order.
pub struct SelectStep {
    indices: Option<Vec<usize>>,
}

impl SelectStep {
    /// Resolves column names against the input schema.
    ///
    /// An empty list or `*` keeps every column.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unknown column.
    pub fn new(step: &str, columns: &[String], input: &RowSchema) -> Result<Self, PipelineError> {
        if columns.is_empty() || (columns.len() == 1 && columns[0] == "*") {
            return Ok(Self { indices: None });
        }
        let (_, indices) = input.project(columns).map_err(|missing| PipelineError::Step {
            step: step.to_string(),
            message: format!("unknown column '{missing}'"),
        })?;
        Ok(Self {
            indices: Some(indices),
        })
    }
}

impl RowTransform for SelectStep {
    fn process(&mut self, row: Row) -> Result<StepFlow, PipelineError> {
        Ok(StepFlow::Emit(match &self.indices {
            None => row,
            Some(indices) => row.project(indices),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapline_common::types::{ColumnMeta, LogicalType, Value};

    #[test]
    fn test_select_reorders() {
        let schema = RowSchema::new(vec![
            ColumnMeta::new("a", LogicalType::Int64),
            ColumnMeta::new("b", LogicalType::String),
        ]);
        let mut step = SelectStep::new("s", &["B".to_string(), "a".to_string()], &schema).unwrap();
        let out = step
            .process(Row::new(vec![Value::Int64(1), Value::from("x")]))
            .unwrap();
        assert_eq!(out, StepFlow::Emit(Row::new(vec![Value::from("x"), Value::Int64(1)])));
    }
}
