//! Row count limit.

use super::{RowTransform, StepFlow};
use crate::execution::PipelineError;
use tapline_common::types::Row;

/// Passes the first `count` rows, then finishes the pipeline.
pub struct LimitStep {
    remaining: u64,
}

impl LimitStep {
    /// Creates a limit.
    #[must_use]
    pub fn new(count: u64) -> Self {
        Self { remaining: count }
    }
}

impl RowTransform for LimitStep {
    fn process(&mut self, row: Row) -> Result<StepFlow, PipelineError> {
        Ok(match self.remaining {
            0 => StepFlow::Finish,
            1 => {
                self.remaining = 0;
                StepFlow::EmitAndFinish(row)
            }
            _ => {
                self.remaining -= 1;
                StepFlow::Emit(row)
            }
        })
    }
}
