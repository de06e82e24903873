//! The local pipeline engine.
//!
//! Every [`LocalPipeline`] runs on a dedicated worker thread. The worker
//! pulls a row from the source, notifies the source step's listeners, then
//! hands the row through each transform in turn, notifying each step's
//! listeners as the row passes. Rows therefore reach every listener in
//! emission order.

use super::input::RowInput;
use super::meta::{PipelineMeta, StepKind};
use super::steps::{RowSource, RowTransform, StepFlow, build_source, build_transform};
use super::{
    CompletionListener, Pipeline, PipelineError, PipelineFactory, RowListener, StepHandle,
    StepOutcome,
};
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tapline_common::types::{Row, RowSchema};
use tapline_common::utils::error::{Error, Result};

/// Default capacity of an injector's input queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

enum Completion {
    Pending(Vec<CompletionListener>),
    Done(StepOutcome),
}

/// A step of a [`LocalPipeline`].
pub struct LocalStep {
    name: String,
    schema: RowSchema,
    row_listeners: Mutex<Vec<RowListener>>,
    completion: Mutex<Completion>,
}

impl LocalStep {
    fn new(name: String, schema: RowSchema) -> Self {
        Self {
            name,
            schema,
            row_listeners: Mutex::new(Vec::new()),
            completion: Mutex::new(Completion::Pending(Vec::new())),
        }
    }

    fn emit(&self, row: &Row) {
        for listener in self.row_listeners.lock().iter_mut() {
            listener(row);
        }
    }

    fn complete(&self, outcome: &StepOutcome) {
        let listeners = {
            let mut completion = self.completion.lock();
            match std::mem::replace(&mut *completion, Completion::Done(outcome.clone())) {
                Completion::Pending(listeners) => listeners,
                Completion::Done(_) => Vec::new(),
            }
        };
        for listener in listeners {
            listener(outcome);
        }
    }
}

impl StepHandle for LocalStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> RowSchema {
        self.schema.clone()
    }

    fn add_row_listener(&self, listener: RowListener) {
        self.row_listeners.lock().push(listener);
    }

    fn add_completion_listener(&self, listener: CompletionListener) {
        let mut completion = self.completion.lock();
        match &mut *completion {
            Completion::Pending(listeners) => listeners.push(listener),
            Completion::Done(outcome) => {
                let outcome = outcome.clone();
                drop(completion);
                listener(&outcome);
            }
        }
    }
}

enum Phase {
    Built,
    Running,
    Done(StepOutcome),
}

struct Shared {
    steps: Vec<Arc<LocalStep>>,
    stop: AtomicBool,
    phase: Mutex<Phase>,
    finished: Condvar,
}

struct Runner {
    source: Box<dyn RowSource>,
    transforms: Vec<Box<dyn RowTransform>>,
}

/// A pipeline running on its own worker thread.
pub struct LocalPipeline {
    name: String,
    id: String,
    shared: Arc<Shared>,
    runner: Mutex<Option<Runner>>,
    input: Option<RowInput>,
}

impl LocalPipeline {
    /// Builds a pipeline from a definition.
    ///
    /// Parameter references must already be substituted.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition is malformed or a step cannot be
    /// configured.
    pub fn build(id: &str, meta: &PipelineMeta, queue_capacity: usize) -> Result<Self> {
        let schemas = meta.output_schemas()?;

        let (input, receiver) = match meta.steps.first().map(|s| &s.kind) {
            Some(StepKind::Injector { .. }) => {
                let (input, receiver) = RowInput::bounded(queue_capacity);
                (Some(input), Some(receiver))
            }
            _ => (None, None),
        };

        let source = build_source(&meta.steps[0], &schemas[0], receiver)?;
        let transforms = meta.steps[1..]
            .iter()
            .zip(&schemas)
            .map(|(step, input_schema)| build_transform(step, input_schema))
            .collect::<std::result::Result<Vec<_>, PipelineError>>()?;

        let steps = meta
            .steps
            .iter()
            .zip(schemas)
            .map(|(step, schema)| Arc::new(LocalStep::new(step.name.clone(), schema)))
            .collect();

        Ok(Self {
            name: meta.name.clone(),
            id: id.to_string(),
            shared: Arc::new(Shared {
                steps,
                stop: AtomicBool::new(false),
                phase: Mutex::new(Phase::Built),
                finished: Condvar::new(),
            }),
            runner: Mutex::new(Some(Runner { source, transforms })),
            input,
        })
    }
}

fn run(runner: Runner, shared: &Shared) -> StepOutcome {
    let Runner {
        mut source,
        mut transforms,
    } = runner;
    let stopped = || shared.stop.load(Ordering::Acquire);

    'rows: loop {
        if stopped() {
            return StepOutcome::Stopped;
        }
        let row = match source.next_row(&shared.stop) {
            Ok(Some(row)) => row,
            Ok(None) if stopped() => return StepOutcome::Stopped,
            Ok(None) => return StepOutcome::Finished,
            Err(e) => return StepOutcome::Failed(e.to_string()),
        };
        shared.steps[0].emit(&row);

        let mut current = row;
        let mut finish = false;
        for (i, transform) in transforms.iter_mut().enumerate() {
            let step = &shared.steps[i + 1];
            match transform.process(current) {
                Ok(StepFlow::Emit(row)) => {
                    step.emit(&row);
                    current = row;
                }
                Ok(StepFlow::EmitAndFinish(row)) => {
                    step.emit(&row);
                    current = row;
                    finish = true;
                }
                Ok(StepFlow::Skip) => continue 'rows,
                Ok(StepFlow::Finish) => return StepOutcome::Finished,
                Err(e) => return StepOutcome::Failed(e.to_string()),
            }
        }
        if finish {
            return StepOutcome::Finished;
        }
    }
}

impl Pipeline for LocalPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn start(&self) -> Result<()> {
        let runner = self
            .runner
            .lock()
            .take()
            .ok_or_else(|| PipelineError::AlreadyStarted(self.name.clone()))?;
        *self.shared.phase.lock() = Phase::Running;

        let shared = Arc::clone(&self.shared);
        let name = self.name.clone();
        let id = self.id.clone();
        std::thread::Builder::new()
            .name(format!("pipeline-{}", self.id))
            .spawn(move || {
                tracing::debug!(pipeline = %name, id = %id, "pipeline started");
                let outcome = run(runner, &shared);
                match &outcome {
                    StepOutcome::Failed(message) => {
                        tracing::warn!(pipeline = %name, id = %id, error = %message, "pipeline failed");
                    }
                    other => tracing::debug!(pipeline = %name, id = %id, outcome = ?other, "pipeline completed"),
                }
                for step in &shared.steps {
                    step.complete(&outcome);
                }
                *shared.phase.lock() = Phase::Done(outcome);
                shared.finished.notify_all();
            })
            .map_err(|e| {
                *self.shared.phase.lock() = Phase::Built;
                Error::Pipeline(format!("cannot spawn worker for '{}': {e}", self.name))
            })?;
        Ok(())
    }

    fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    fn is_running(&self) -> bool {
        matches!(*self.shared.phase.lock(), Phase::Running)
    }

    fn find_step(&self, name: &str) -> Option<Arc<dyn StepHandle>> {
        self.shared
            .steps
            .iter()
            .find(|s| s.name == name)
            .map(|s| Arc::clone(s) as Arc<dyn StepHandle>)
    }

    fn row_input(&self) -> Option<RowInput> {
        self.input.clone()
    }

    fn wait_until_finished(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut phase = self.shared.phase.lock();
        loop {
            match &*phase {
                Phase::Done(_) => return true,
                Phase::Built => return false,
                Phase::Running => {}
            }
            match deadline {
                Some(deadline) => {
                    if self.shared.finished.wait_until(&mut phase, deadline).timed_out() {
                        return matches!(*phase, Phase::Done(_));
                    }
                }
                None => self.shared.finished.wait(&mut phase),
            }
        }
    }

    fn outcome(&self) -> Option<StepOutcome> {
        match &*self.shared.phase.lock() {
            Phase::Done(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }
}

impl Drop for LocalPipeline {
    fn drop(&mut self) {
        self.stop();
        if let Some(input) = &self.input {
            input.signal_no_more_rows();
        }
    }
}

/// Builds [`LocalPipeline`]s.
#[derive(Debug, Clone)]
pub struct LocalPipelineFactory {
    queue_capacity: usize,
}

impl LocalPipelineFactory {
    /// Creates a factory with the default queue capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Sets the capacity of injector input queues.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

impl Default for LocalPipelineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineFactory for LocalPipelineFactory {
    fn build(
        &self,
        id: &str,
        meta: &PipelineMeta,
        params: &IndexMap<String, String>,
    ) -> Result<Arc<dyn Pipeline>> {
        let meta = meta.with_substitutions(params);
        Ok(Arc::new(LocalPipeline::build(id, &meta, self.queue_capacity)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, Operator};
    use crate::execution::meta::DocumentField;
    use serde_json::json;
    use tapline_common::types::{ColumnMeta, LogicalType, Value};

    fn numbers(count: Option<u64>) -> PipelineMeta {
        PipelineMeta::new("numbers")
            .with_step("gen", StepKind::Sequence { column: "n".into(), start: 0, count })
            .with_step(
                "odd",
                StepKind::Filter {
                    condition: Condition::compare("n", Operator::Gte, 0i64),
                },
            )
    }

    fn collect(step: &Arc<dyn StepHandle>) -> Arc<Mutex<Vec<i64>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        step.add_row_listener(Box::new(move |row: &Row| {
            sink.lock().push(row.values()[0].as_int64().unwrap_or(-1));
        }));
        seen
    }

    #[test]
    fn test_runs_to_completion_in_order() {
        let pipeline = LocalPipeline::build("t1", &numbers(Some(100)), 8).unwrap();
        let seen = collect(&pipeline.find_step("odd").unwrap());
        let outcome = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&outcome);
        pipeline
            .find_step("odd")
            .unwrap()
            .add_completion_listener(Box::new(move |o: &StepOutcome| *slot.lock() = Some(o.clone())));

        pipeline.start().unwrap();
        assert!(pipeline.wait_until_finished(Some(Duration::from_secs(5))));
        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
        assert_eq!(*outcome.lock(), Some(StepOutcome::Finished));
        assert!(!pipeline.is_running());
        assert!(pipeline.start().is_err());
    }

    #[test]
    fn test_limit_finishes_early() {
        let meta = numbers(None).with_step("cap", StepKind::Limit { count: 3 });
        let pipeline = LocalPipeline::build("t2", &meta, 8).unwrap();
        let seen = collect(&pipeline.find_step("cap").unwrap());
        pipeline.start().unwrap();
        assert!(pipeline.wait_until_finished(Some(Duration::from_secs(5))));
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert_eq!(pipeline.outcome(), Some(StepOutcome::Finished));
    }

    #[test]
    fn test_stop_unbounded_source() {
        let pipeline = LocalPipeline::build("t3", &numbers(None), 8).unwrap();
        pipeline.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        pipeline.stop();
        assert!(pipeline.wait_until_finished(Some(Duration::from_secs(5))));
        assert_eq!(pipeline.outcome(), Some(StepOutcome::Stopped));
    }

    #[test]
    fn test_injector_pipeline() {
        let schema = RowSchema::new(vec![ColumnMeta::new("n", LogicalType::Int64)]);
        let meta = PipelineMeta::new("result")
            .with_step("in", StepKind::Injector { schema })
            .with_step("out", StepKind::Select { columns: vec![] });
        let pipeline = LocalPipeline::build("t4", &meta, 2).unwrap();
        let seen = collect(&pipeline.find_step("out").unwrap());
        let input = pipeline.row_input().unwrap();
        pipeline.start().unwrap();
        for i in 0..10 {
            while !input.put_row_with_timeout(Row::new(vec![Value::Int64(i)]), Duration::from_millis(50)) {}
        }
        input.signal_no_more_rows();
        assert!(pipeline.wait_until_finished(Some(Duration::from_secs(5))));
        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_runtime_failure_reported() {
        let meta = PipelineMeta::new("docs").with_step(
            "scan",
            StepKind::Documents {
                fields: vec![DocumentField::new("n", LogicalType::Int64)],
                documents: vec![json!({"n": 1}), json!({"n": "many"})],
                query: None,
            },
        );
        let pipeline = LocalPipeline::build("t5", &meta, 2).unwrap();
        pipeline.start().unwrap();
        assert!(pipeline.wait_until_finished(Some(Duration::from_secs(5))));
        assert!(pipeline.outcome().unwrap().is_failure());
    }

    #[test]
    fn test_late_completion_listener_fires() {
        let pipeline = LocalPipeline::build("t6", &numbers(Some(1)), 2).unwrap();
        pipeline.start().unwrap();
        assert!(pipeline.wait_until_finished(Some(Duration::from_secs(5))));
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        pipeline
            .find_step("gen")
            .unwrap()
            .add_completion_listener(Box::new(move |_: &StepOutcome| flag.store(true, Ordering::SeqCst)));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_factory_substitutes_parameters() {
        let meta = PipelineMeta::new("p")
            .with_parameter(crate::execution::ParameterDef::new("MIN").with_default("5"))
            .with_step(
                "grid",
                StepKind::Rows {
                    schema: RowSchema::new(vec![ColumnMeta::new("n", LogicalType::Int64)]),
                    rows: vec![vec![json!("${MIN}")]],
                },
            );
        let mut params = IndexMap::new();
        params.insert("MIN".to_string(), "7".to_string());
        let pipeline = LocalPipelineFactory::new().build("t7", &meta, &params).unwrap();
        let seen = collect(&pipeline.find_step("grid").unwrap());
        pipeline.start().unwrap();
        assert!(pipeline.wait_until_finished(Some(Duration::from_secs(5))));
        assert_eq!(*seen.lock(), vec![7]);
    }
}
