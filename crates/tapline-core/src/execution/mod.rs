//! Pipeline execution.
//!
//! A pipeline is a linear chain of named steps: one source step followed by
//! row transforms. Each running pipeline owns one worker thread that pulls
//! rows from the source and pushes them through the transforms. Observers
//! attach to individual steps to see every row the step emits and to learn
//! when it completes.
//!
//! The query layer only talks to the [`Pipeline`] and [`StepHandle`] traits
//! and the bounded [`RowInput`], so another engine can be plugged in through
//! a [`PipelineFactory`].
//!
//! ## Submodules
//!
//! - [`meta`] - Serializable pipeline definitions and parameter substitution
//! - [`input`] - Bounded row input queue for injector steps
//! - [`steps`] - Step implementations
//! - [`pipeline`] - The local, thread-per-pipeline engine

pub mod input;
pub mod meta;
pub mod pipeline;
pub mod steps;

pub use input::RowInput;
pub use meta::{DocumentField, ParameterDef, PipelineMeta, StepKind, StepMeta, substitute};
pub use pipeline::{LocalPipeline, LocalPipelineFactory};

use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tapline_common::types::{Row, RowSchema};
use tapline_common::utils::error::{Error, Result};
use thiserror::Error;

/// Error raised while building or running a pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The definition is invalid.
    #[error("invalid pipeline '{pipeline}': {message}")]
    Build {
        /// Pipeline name.
        pipeline: String,
        /// What is wrong.
        message: String,
    },

    /// A step failed while processing rows.
    #[error("step '{step}' failed: {message}")]
    Step {
        /// Step name.
        step: String,
        /// Failure description.
        message: String,
    },

    /// The pipeline was started twice.
    #[error("pipeline '{0}' was already started")]
    AlreadyStarted(String),
}

impl From<PipelineError> for Error {
    fn from(e: PipelineError) -> Self {
        Error::Pipeline(e.to_string())
    }
}

/// How a step (and the pipeline it belongs to) ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// All input was consumed, or a step finished the pipeline early.
    Finished,
    /// The pipeline was stopped from outside.
    Stopped,
    /// A step failed.
    Failed(String),
}

impl StepOutcome {
    /// Returns whether the outcome is a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Called for every row a step emits, on the pipeline's worker thread.
pub type RowListener = Box<dyn FnMut(&Row) + Send>;

/// Called once when a step completes.
pub type CompletionListener = Box<dyn FnOnce(&StepOutcome) + Send>;

/// A step of a built pipeline, as seen from outside.
pub trait StepHandle: Send + Sync {
    /// Returns the step name.
    fn name(&self) -> &str;

    /// Returns the schema of rows the step emits.
    fn schema(&self) -> RowSchema;

    /// Registers a listener for every emitted row.
    ///
    /// Listeners run synchronously on the worker thread, so a listener that
    /// blocks holds up the whole pipeline.
    fn add_row_listener(&self, listener: RowListener);

    /// Registers a listener for step completion.
    ///
    /// If the step already completed, the listener runs immediately.
    fn add_completion_listener(&self, listener: CompletionListener);
}

/// A built, runnable pipeline.
pub trait Pipeline: Send + Sync {
    /// Returns the pipeline name.
    fn name(&self) -> &str;

    /// Returns the identifier of this particular run.
    fn id(&self) -> &str;

    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline was already started or the thread
    /// cannot be spawned.
    fn start(&self) -> Result<()>;

    /// Asks the pipeline to stop. Best effort: the worker notices between
    /// rows.
    fn stop(&self);

    /// Returns whether the pipeline was started and has not yet completed.
    fn is_running(&self) -> bool;

    /// Finds a step by name.
    fn find_step(&self, name: &str) -> Option<Arc<dyn StepHandle>>;

    /// Returns the input queue of the pipeline's injector step, if it has one.
    fn row_input(&self) -> Option<RowInput>;

    /// Blocks until the pipeline completes or the timeout elapses.
    ///
    /// Returns `true` if the pipeline completed.
    fn wait_until_finished(&self, timeout: Option<Duration>) -> bool;

    /// Returns the outcome once the pipeline has completed.
    fn outcome(&self) -> Option<StepOutcome>;
}

/// Builds pipelines from definitions.
pub trait PipelineFactory: Send + Sync {
    /// Builds a pipeline with the given run identifier.
    ///
    /// `${NAME}` references in step configuration are replaced with the
    /// supplied parameter values, falling back to the declared defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition is invalid for this engine.
    fn build(
        &self,
        id: &str,
        meta: &PipelineMeta,
        params: &IndexMap<String, String>,
    ) -> Result<Arc<dyn Pipeline>>;
}
