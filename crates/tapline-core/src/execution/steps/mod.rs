//! Step implementations.
//!
//! Sources produce rows one at a time; transforms take a row and decide what
//! flows on. Both are driven by the pipeline's worker thread.
//!
//! - Rows / Sequence: static and generated data
//! - Documents: JSON document scan with a native filter
//! - Injector: rows written from outside through a [`RowInput`](super::RowInput)
//! - Filter: condition evaluation
//! - Select: projection
//! - Limit: row count cap

mod documents;
mod filter;
mod injector;
mod limit;
mod rows;
mod select;

pub use documents::{DocumentFilter, DocumentScan};
pub use filter::FilterStep;
pub use injector::InjectorSource;
pub use limit::LimitStep;
pub use rows::{RowsSource, SequenceSource};
pub use select::SelectStep;

use super::PipelineError;
use super::meta::{StepKind, StepMeta};
use crossbeam::channel::Receiver;
use std::sync::atomic::AtomicBool;
use tapline_common::types::{Row, RowSchema};

/// What a transform does with a row.
#[derive(Debug, Clone, PartialEq)]
pub enum StepFlow {
    /// Pass the row on.
    Emit(Row),
    /// Drop the row.
    Skip,
    /// Pass the row on, then end the pipeline.
    EmitAndFinish(Row),
    /// Drop the row and end the pipeline.
    Finish,
}

/// Produces the rows of a pipeline.
pub trait RowSource: Send {
    /// Returns the next row, or `None` when exhausted.
    ///
    /// Sources that block must return `None` soon after `stop` is set.
    fn next_row(&mut self, stop: &AtomicBool) -> Result<Option<Row>, PipelineError>;
}

/// Transforms rows flowing through a pipeline.
pub trait RowTransform: Send {
    /// Processes one row.
    fn process(&mut self, row: Row) -> Result<StepFlow, PipelineError>;
}

/// Creates the source for the first step.
///
/// Injector steps consume `input`, which must be provided for them.
///
/// # Errors
///
/// Returns an error if the step is not a source or its configuration is
/// invalid.
pub fn build_source(
    step: &StepMeta,
    schema: &RowSchema,
    input: Option<Receiver<Row>>,
) -> Result<Box<dyn RowSource>, PipelineError> {
    match &step.kind {
        StepKind::Rows { rows, .. } => Ok(Box::new(RowsSource::new(&step.name, schema, rows)?)),
        StepKind::Sequence { start, count, .. } => Ok(Box::new(SequenceSource::new(*start, *count))),
        StepKind::Documents {
            fields,
            documents,
            query,
        } => Ok(Box::new(DocumentScan::new(
            &step.name,
            fields.clone(),
            documents.clone(),
            query.as_deref(),
        )?)),
        StepKind::Injector { .. } => {
            let input = input.ok_or_else(|| PipelineError::Step {
                step: step.name.clone(),
                message: "injector has no input queue".to_string(),
            })?;
            Ok(Box::new(InjectorSource::new(input)))
        }
        other => Err(PipelineError::Step {
            step: step.name.clone(),
            message: format!("{} steps cannot start a pipeline", other.label()),
        }),
    }
}

/// Creates a transform for a step after the first.
///
/// # Errors
///
/// Returns an error if the step is a source or cannot be bound to its input
/// schema.
pub fn build_transform(
    step: &StepMeta,
    input: &RowSchema,
) -> Result<Box<dyn RowTransform>, PipelineError> {
    match &step.kind {
        StepKind::Filter { condition } => Ok(Box::new(FilterStep::new(&step.name, condition, input)?)),
        StepKind::Select { columns } => Ok(Box::new(SelectStep::new(&step.name, columns, input)?)),
        StepKind::Limit { count } => Ok(Box::new(LimitStep::new(*count))),
        other => Err(PipelineError::Step {
            step: step.name.clone(),
            message: format!("{} steps must come first", other.label()),
        }),
    }
}
