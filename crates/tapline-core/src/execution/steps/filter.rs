//! Condition filter.

use super::{RowTransform, StepFlow};
use crate::condition::{BoundCondition, Condition, SchemaResolver};
use crate::execution::PipelineError;
use tapline_common::types::{Row, RowSchema};

/// Keeps rows satisfying a condition.
pub struct FilterStep {
    condition: BoundCondition,
}

impl FilterStep {
    /// Binds the condition to the input schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the condition names an unknown column or a literal
    /// does not fit its column's type.
    pub fn new(step: &str, condition: &Condition, input: &RowSchema) -> Result<Self, PipelineError> {
        let resolver = SchemaResolver::new(input.clone());
        let condition =
            BoundCondition::bind(condition, input, &resolver).map_err(|e| PipelineError::Step {
                step: step.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { condition })
    }
}

impl RowTransform for FilterStep {
    fn process(&mut self, row: Row) -> Result<StepFlow, PipelineError> {
        Ok(if self.condition.matches(&row) {
            StepFlow::Emit(row)
        } else {
            StepFlow::Skip
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;
    use tapline_common::types::{ColumnMeta, LogicalType, Value};

    #[test]
    fn test_filter() {
        let schema = RowSchema::new(vec![ColumnMeta::new("n", LogicalType::Int64)]);
        let mut step =
            FilterStep::new("f", &Condition::compare("n", Operator::Lt, 2i64), &schema).unwrap();
        let one = Row::new(vec![Value::Int64(1)]);
        assert_eq!(step.process(one.clone()).unwrap(), StepFlow::Emit(one));
        assert_eq!(step.process(Row::new(vec![Value::Int64(2)])).unwrap(), StepFlow::Skip);
    }

    #[test]
    fn test_unknown_column() {
        let schema = RowSchema::new(vec![ColumnMeta::new("n", LogicalType::Int64)]);
        let err = FilterStep::new("f", &Condition::compare("m", Operator::Eq, 1i64), &schema)
            .err()
            .unwrap();
        assert!(err.to_string().contains("unknown column 'm'"));
    }
}
