//! Static and generated row sources.

use super::RowSource;
use crate::condition::resolver::coerce_json;
use crate::execution::PipelineError;
use std::sync::atomic::AtomicBool;
use tapline_common::types::{Row, RowSchema, Value};

/// Emits a fixed set of rows.
pub struct RowsSource {
    rows: std::vec::IntoIter<Row>,
}

impl RowsSource {
    /// Converts the JSON grid into typed rows.
    ///
    /// # Errors
    ///
    /// Returns an error if a row has the wrong width or a cell does not fit
    /// its column type.
    pub fn new(
        step: &str,
        schema: &RowSchema,
        grid: &[Vec<serde_json::Value>],
    ) -> Result<Self, PipelineError> {
        let step_error = |message: String| PipelineError::Step {
            step: step.to_string(),
            message,
        };
        let mut rows = Vec::with_capacity(grid.len());
        for (i, cells) in grid.iter().enumerate() {
            if cells.len() != schema.len() {
                return Err(step_error(format!(
                    "row {i} has {} values, expected {}",
                    cells.len(),
                    schema.len()
                )));
            }
            let values = cells
                .iter()
                .zip(schema.columns())
                .map(|(cell, column)| coerce_json(cell, column.logical_type))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| step_error(format!("row {i}: {e}")))?;
            rows.push(Row::new(values));
        }
        Ok(Self {
            rows: rows.into_iter(),
        })
    }
}

impl RowSource for RowsSource {
    fn next_row(&mut self, _stop: &AtomicBool) -> Result<Option<Row>, PipelineError> {
        Ok(self.rows.next())
    }
}

/// Emits `start, start + 1, ...`.
pub struct SequenceSource {
    next: i64,
    remaining: Option<u64>,
}

impl SequenceSource {
    /// Creates a sequence; `count` of `None` never ends on its own.
    #[must_use]
    pub fn new(start: i64, count: Option<u64>) -> Self {
        Self {
            next: start,
            remaining: count,
        }
    }
}

impl RowSource for SequenceSource {
    fn next_row(&mut self, _stop: &AtomicBool) -> Result<Option<Row>, PipelineError> {
        if let Some(remaining) = &mut self.remaining {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }
        let value = self.next;
        self.next = self.next.wrapping_add(1);
        Ok(Some(Row::new(vec![Value::Int64(value)])))
    }
}
