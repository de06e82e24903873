//! Query execution.
//!
//! [`QueryExecutor::execute`] turns a SQL query into two running pipelines:
//! the service pipeline, which produces the service's rows, and a small
//! result pipeline that applies the query's WHERE, column list and LIMIT.
//! A [`Bridge`] moves rows between them and a [`ResultStream`] hands the
//! result rows to the caller.
//!
//! ```text
//! service pipeline ─ step ─▶ bridge ─▶ input ▶ where ▶ select ▶ limit ─▶ ResultStream
//! ```
//!
//! Everything that can fail before the first row (parsing, service lookup,
//! optimization activation, pipeline builds) fails the call itself. Failures
//! after that arrive as an `Err` item that ends the stream.

use crate::bridge::{Bridge, BridgeOptions};
use crate::cache::ServiceCache;
use crate::config::Config;
use crate::optimization::{
    Activation, ActivationContext, Optimization, OptimizationPreview, PendingCacheWrite,
    build_optimizations,
};
use crate::service::{ServiceDefinition, ServiceRegistry};
use crossbeam::channel::{self, Receiver, Sender};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tapline_adapters::cache::{CacheManager, CachedResult, MemoryCacheManager};
use tapline_adapters::plugins::{CACHE_MANAGER, ProviderRegistry};
use tapline_adapters::query::sql::{self, SqlQuery};
use tapline_common::types::{Row, RowSchema};
use tapline_common::utils::error::{Error, QueryError, QueryErrorKind, Result};
use tapline_common::utils::hash::FingerprintBuilder;
use tapline_core::execution::meta::rows_to_json;
use tapline_core::execution::{
    LocalPipelineFactory, Pipeline, PipelineFactory, PipelineMeta, StepHandle, StepKind,
    StepOutcome,
};

/// Per-query settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Most rows returned to the caller; `None` uses the configured limit
    /// and 0 is unlimited.
    pub max_rows: Option<u64>,
    /// Time limit; `None` uses the configured limit and zero is unlimited.
    pub time_limit: Option<Duration>,
    /// Pipeline parameter values.
    pub params: IndexMap<String, String>,
}

impl QueryOptions {
    /// Creates options that follow the configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the row cutoff.
    #[must_use]
    pub fn with_max_rows(mut self, rows: u64) -> Self {
        self.max_rows = Some(rows);
        self
    }

    /// Sets the time limit.
    #[must_use]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Sets one parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Replaces all parameters.
    #[must_use]
    pub fn with_params(mut self, params: IndexMap<String, String>) -> Self {
        self.params = params;
        self
    }
}

/// What executing a query would do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    /// Resolved service name.
    pub service: String,
    /// Step that supplies the rows.
    pub step: String,
    /// Schema of the service rows.
    pub schema: RowSchema,
    /// One preview per enabled optimization, in activation order.
    pub optimizations: Vec<OptimizationPreview>,
}

enum Delivery {
    Row(Row),
    Done,
    Failed(Error),
}

/// The rows of a running query.
///
/// Iterating blocks until the next row is available. The stream ends with
/// `None` after the last row, or with a single `Err` item if the query fails
/// mid-way. Dropping the stream stops both pipelines.
pub struct ResultStream {
    service_name: String,
    schema: RowSchema,
    service: Arc<dyn Pipeline>,
    result: Arc<dyn Pipeline>,
    bridge: Bridge,
    receiver: Receiver<Delivery>,
    timed_out: Arc<AtomicBool>,
    row_cap: u64,
    delivered: u64,
    from_cache: bool,
    finished: bool,
}

impl ResultStream {
    /// Returns the schema of the result rows.
    #[must_use]
    pub fn schema(&self) -> &RowSchema {
        &self.schema
    }

    /// Returns the queried service.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns the identifier of the service pipeline run.
    #[must_use]
    pub fn service_pipeline_id(&self) -> &str {
        self.service.id()
    }

    /// Returns the identifier of the result pipeline run.
    #[must_use]
    pub fn result_pipeline_id(&self) -> &str {
        self.result.id()
    }

    /// Returns whether the rows were replayed from the cache.
    #[must_use]
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Returns whether a row limit or the time limit ended the result.
    ///
    /// Reaching the caller's row limit counts even when the service had no
    /// rows left.
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.bridge.cutoff_hit()
            || self.timed_out.load(Ordering::Acquire)
            || (self.row_cap > 0 && self.delivered >= self.row_cap)
    }

    /// Stops the query. Rows already buffered are still returned.
    pub fn cancel(&self) {
        self.bridge.abandon();
        self.result.stop();
    }

    /// Reads every remaining row.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the stream, if any.
    pub fn collect_rows(self) -> Result<Vec<Row>> {
        self.collect()
    }
}

impl Iterator for ResultStream {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.receiver.recv() {
            Ok(Delivery::Row(row)) => {
                self.delivered += 1;
                Some(Ok(row))
            }
            Ok(Delivery::Failed(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            Ok(Delivery::Done) | Err(_) => {
                self.finished = true;
                None
            }
        }
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(service = %self.service_name, "result stream dropped early");
        }
        self.bridge.abandon();
        self.result.stop();
        self.service.stop();
    }
}

struct Prepared {
    service: Arc<ServiceDefinition>,
    query: SqlQuery,
    optimizations: Vec<Box<dyn Optimization>>,
    meta: PipelineMeta,
}

/// Executes SQL queries against registered services.
pub struct QueryExecutor {
    config: Config,
    registry: Arc<dyn ServiceRegistry>,
    factory: Arc<dyn PipelineFactory>,
    cache: Arc<ServiceCache>,
    runs: AtomicU64,
}

impl QueryExecutor {
    /// Creates an executor with the local pipeline engine and an in-memory
    /// cache manager.
    #[must_use]
    pub fn new(config: Config, registry: Arc<dyn ServiceRegistry>) -> Self {
        let providers: Arc<ProviderRegistry<dyn CacheManager>> = Arc::new(ProviderRegistry::new());
        providers.register(CACHE_MANAGER, Arc::new(MemoryCacheManager::new()));
        Self::with_providers(config, registry, providers)
    }

    /// Creates an executor whose cache manager is looked up in `providers`.
    ///
    /// The manager may register after the executor is created; cache
    /// lookups wait up to the configured provider timeout.
    #[must_use]
    pub fn with_providers(
        config: Config,
        registry: Arc<dyn ServiceRegistry>,
        providers: Arc<ProviderRegistry<dyn CacheManager>>,
    ) -> Self {
        let factory = Arc::new(LocalPipelineFactory::new().with_queue_capacity(config.queue_capacity));
        let cache = Arc::new(ServiceCache::new(
            providers,
            config.cache_template.clone(),
            config.provider_timeout(),
        ));
        Self {
            config,
            registry,
            factory,
            cache,
            runs: AtomicU64::new(0),
        }
    }

    /// Replaces the pipeline engine.
    #[must_use]
    pub fn with_pipeline_factory(mut self, factory: Arc<dyn PipelineFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the service registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn ServiceRegistry> {
        &self.registry
    }

    /// Returns the service cache.
    #[must_use]
    pub fn service_cache(&self) -> &Arc<ServiceCache> {
        &self.cache
    }

    /// Executes a query, returning at most `max_rows` rows (0 = unlimited).
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be started; see the module docs.
    pub fn execute(&self, query: &str, max_rows: u64) -> Result<ResultStream> {
        self.execute_with_options(query, &QueryOptions::new().with_max_rows(max_rows))
    }

    /// Executes a query with pipeline parameter values.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be started.
    pub fn execute_with_params(
        &self,
        query: &str,
        params: IndexMap<String, String>,
    ) -> Result<ResultStream> {
        self.execute_with_options(query, &QueryOptions::new().with_params(params))
    }

    /// Executes a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query does not parse, names an unknown
    /// service or column, an optimization fails, or a pipeline cannot be
    /// built or started.
    pub fn execute_with_options(&self, query_text: &str, options: &QueryOptions) -> Result<ResultStream> {
        let prepared = self.prepare(query_text)?;
        let service_def = &prepared.service;

        let mut ctx = ActivationContext::new(
            service_def,
            &prepared.query,
            prepared.meta.clone(),
            options.params.clone(),
        );
        let mut modified = false;
        let mut replay = None;
        for optimization in &prepared.optimizations {
            let activation = optimization.activate(&mut ctx)?;
            tracing::debug!(
                service = %service_def.name,
                optimization = %optimization.name(),
                activation = activation_label(&activation),
                "optimization activated"
            );
            match activation {
                Activation::PassThrough => {}
                Activation::Modified => modified = true,
                Activation::ShortCircuit(entry) => {
                    replay = Some(entry);
                    break;
                }
            }
        }
        let ActivationContext {
            meta, params, cache_write, ..
        } = ctx;

        let (service_meta, params) = match &replay {
            Some(entry) => (replay_meta(&meta.name, &service_def.step_name, entry), IndexMap::new()),
            None => (meta, params),
        };
        let cache_write = cache_write.filter(|_| replay.is_none() && !modified && !service_def.streaming);

        let (service_id, result_id) = self.run_ids(&service_def.name, query_text);
        let service = self.factory.build(&service_id, &service_meta, &params)?;
        let step = service
            .find_step(&service_def.step_name)
            .ok_or_else(|| Error::StepNotAccessible {
                pipeline: service.name().to_string(),
                step: service_def.step_name.clone(),
            })?;
        let service_schema = step.schema();
        check_columns(&prepared.query, &service_schema, &service_def.name)?;

        // The caller's limit counts result rows, after WHERE. The service
        // cutoff only bounds how much the service may produce.
        let row_limit = options.max_rows.unwrap_or(self.config.row_limit);
        let service_cutoff = match options.max_rows {
            Some(0) => 0,
            Some(rows) if self.config.row_limit != 0 => rows.max(self.config.row_limit),
            _ => self.config.row_limit,
        };
        let (result_meta, output_step) =
            result_meta(&service_def.name, service_schema.clone(), &prepared.query, row_limit);
        let result = self.factory.build(&result_id, &result_meta, &IndexMap::new())?;
        let output = result.find_step(&output_step).ok_or_else(|| Error::StepNotAccessible {
            pipeline: result.name().to_string(),
            step: output_step.clone(),
        })?;
        let schema = output.schema();

        // Registered ahead of the bridge so the entry is written before the
        // reader sees the end of the stream.
        if let Some(pending) = cache_write {
            self.record_for_cache(step.as_ref(), service_schema, pending);
        }

        let bridge = Bridge::install(
            &service,
            &service_def.step_name,
            &result,
            &output_step,
            BridgeOptions {
                row_limit: service_cutoff,
                offer_timeout: self.config.offer_timeout(),
            },
        )?;

        let (sender, receiver) = channel::bounded(self.config.result_buffer.max(1));
        deliver(output.as_ref(), &result, &bridge, sender);

        result.start()?;
        service.start()?;
        tracing::info!(
            service = %service_def.name,
            service_id = %service.id(),
            result_id = %result.id(),
            from_cache = replay.is_some(),
            "query started"
        );

        let timed_out = Arc::new(AtomicBool::new(false));
        let time_limit = match options.time_limit {
            Some(limit) if limit.is_zero() => None,
            Some(limit) => Some(limit),
            None => self.config.time_limit(),
        };
        if let Some(limit) = time_limit {
            watch(&result, &bridge, limit, Arc::clone(&timed_out));
        }

        Ok(ResultStream {
            service_name: service_def.name.clone(),
            schema,
            service,
            result,
            bridge,
            receiver,
            timed_out,
            row_cap: binding_row_cap(prepared.query.limit, row_limit),
            delivered: 0,
            from_cache: replay.is_some(),
            finished: false,
        })
    }

    /// Reports what each optimization would do for a query, without
    /// executing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the query does not parse, the service is unknown
    /// or the service step does not exist.
    pub fn explain(&self, query_text: &str, options: &QueryOptions) -> Result<Explanation> {
        let prepared = self.prepare(query_text)?;
        let schema = prepared.meta.step_schema(&prepared.service.step_name)?;
        let mut ctx = ActivationContext::new(
            &prepared.service,
            &prepared.query,
            prepared.meta.clone(),
            options.params.clone(),
        );
        let optimizations = prepared
            .optimizations
            .iter()
            .map(|optimization| optimization.preview(&mut ctx))
            .collect();
        Ok(Explanation {
            service: prepared.service.name.clone(),
            step: prepared.service.step_name.clone(),
            schema,
            optimizations,
        })
    }

    fn prepare(&self, query_text: &str) -> Result<Prepared> {
        let query = sql::parse(query_text)?;
        let service = self
            .registry
            .get(&query.service_name)
            .ok_or_else(|| Error::ServiceNotFound(query.service_name.clone()))?;

        let optimizations = build_optimizations(&service.optimizations, &self.cache);
        let mut meta = service.pipeline.clone();
        for optimization in &optimizations {
            optimization.init(&mut meta)?;
        }
        if meta.find_step(&service.step_name).is_none() {
            return Err(Error::StepNotAccessible {
                pipeline: meta.name.clone(),
                step: service.step_name.clone(),
            });
        }
        Ok(Prepared {
            service,
            query,
            optimizations,
            meta,
        })
    }

    fn run_ids(&self, service: &str, query: &str) -> (String, String) {
        let run = self.runs.fetch_add(1, Ordering::Relaxed);
        let mut builder = FingerprintBuilder::new();
        builder
            .update_str(service)
            .update_str(query)
            .update(&run.to_le_bytes());
        let short = builder.finish().short();
        (format!("service-{short}"), format!("result-{short}"))
    }

    fn record_for_cache(&self, step: &dyn StepHandle, schema: RowSchema, pending: PendingCacheWrite) {
        let rows = Arc::new(Mutex::new(Vec::new()));
        {
            let rows = Arc::clone(&rows);
            step.add_row_listener(Box::new(move |row: &Row| rows.lock().push(row.clone())));
        }
        let cache = Arc::clone(&self.cache);
        step.add_completion_listener(Box::new(move |outcome: &StepOutcome| {
            if *outcome == StepOutcome::Finished {
                let rows = std::mem::take(&mut *rows.lock());
                cache.store(&pending.cache_name, pending.key, CachedResult::new(schema, rows));
            } else {
                tracing::debug!(cache = %pending.cache_name, outcome = ?outcome, "incomplete run not cached");
            }
        }));
    }
}

fn activation_label(activation: &Activation) -> &'static str {
    match activation {
        Activation::PassThrough => "pass-through",
        Activation::Modified => "modified",
        Activation::ShortCircuit(_) => "short-circuit",
    }
}

/// A one-step pipeline that replays a cached result under the service
/// step's name.
fn replay_meta(name: &str, step: &str, entry: &CachedResult) -> PipelineMeta {
    PipelineMeta::new(name).with_step(
        step,
        StepKind::Rows {
            schema: entry.schema.clone(),
            rows: rows_to_json(&entry.rows),
        },
    )
}

fn check_columns(query: &SqlQuery, schema: &RowSchema, service: &str) -> Result<()> {
    let referenced = query
        .projected_columns
        .iter()
        .map(String::as_str)
        .chain(query.condition.iter().flat_map(|c| c.columns()));
    for column in referenced {
        if schema.index_of(column).is_none() {
            return Err(Error::Query(QueryError::new(
                QueryErrorKind::Semantic,
                format!("service '{service}' has no column '{column}'"),
            )));
        }
    }
    Ok(())
}

/// The row limit, when it is tighter than the query's own LIMIT.
fn binding_row_cap(query_limit: Option<u64>, row_limit: u64) -> u64 {
    match query_limit {
        Some(limit) if limit <= row_limit => 0,
        _ => row_limit,
    }
}

/// Builds the result pipeline and returns it with its output step name.
fn result_meta(service: &str, schema: RowSchema, query: &SqlQuery, row_limit: u64) -> (PipelineMeta, String) {
    let mut meta = PipelineMeta::new(format!("{service}-result")).with_step("input", StepKind::Injector { schema });
    if let Some(condition) = &query.condition {
        meta = meta.with_step(
            "where",
            StepKind::Filter {
                condition: condition.clone(),
            },
        );
    }
    meta = meta.with_step(
        "select",
        StepKind::Select {
            columns: query.projected_columns.clone(),
        },
    );
    let limit = match (query.limit, row_limit) {
        (Some(limit), 0) => Some(limit),
        (Some(limit), cutoff) => Some(limit.min(cutoff)),
        (None, 0) => None,
        (None, cutoff) => Some(cutoff),
    };
    if let Some(count) = limit {
        meta = meta.with_step("limit", StepKind::Limit { count });
    }
    let output = meta.steps.last().map(|s| s.name.clone()).unwrap_or_default();
    (meta, output)
}

/// Forwards the output step's rows and completion to the reader.
fn deliver(output: &dyn StepHandle, result: &Arc<dyn Pipeline>, bridge: &Bridge, sender: Sender<Delivery>) {
    {
        let sender = sender.clone();
        let result = Arc::downgrade(result);
        let bridge = bridge.clone();
        output.add_row_listener(Box::new(move |row: &Row| {
            if sender.send(Delivery::Row(row.clone())).is_err() {
                // The reader is gone.
                bridge.abandon();
                if let Some(result) = result.upgrade() {
                    result.stop();
                }
            }
        }));
    }
    let bridge = bridge.clone();
    output.add_completion_listener(Box::new(move |outcome: &StepOutcome| {
        let failure = match outcome {
            StepOutcome::Failed(message) => Some(message.clone()),
            _ => bridge.service_failure(),
        };
        let delivery = match failure {
            Some(message) => Delivery::Failed(Error::Pipeline(message)),
            None => Delivery::Done,
        };
        // A closed channel means nobody is listening any more.
        let _ = sender.send(delivery);
    }));
}

/// Stops the service if the result pipeline outlives `limit`.
fn watch(result: &Arc<dyn Pipeline>, bridge: &Bridge, limit: Duration, timed_out: Arc<AtomicBool>) {
    let result = Arc::clone(result);
    let bridge = bridge.clone();
    let spawned = std::thread::Builder::new()
        .name(format!("watch-{}", result.id()))
        .spawn(move || {
            if !result.wait_until_finished(Some(limit)) {
                tracing::warn!(
                    result_id = %result.id(),
                    limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    "time limit reached, stopping service"
                );
                timed_out.store(true, Ordering::Release);
                bridge.abandon();
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "cannot start time limit watcher, query runs unbounded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MemoryServiceRegistry;
    use tapline_common::types::{ColumnMeta, LogicalType};
    use tapline_core::execution::DocumentField;

    fn numbers(count: Option<u64>) -> ServiceDefinition {
        ServiceDefinition::new(
            "numbers",
            PipelineMeta::new("numbers").with_step(
                "seq",
                StepKind::Sequence {
                    column: "n".to_string(),
                    start: 1,
                    count,
                },
            ),
            "seq",
        )
    }

    fn executor(service: ServiceDefinition, config: Config) -> QueryExecutor {
        let registry = MemoryServiceRegistry::new();
        registry.register(service);
        QueryExecutor::new(config, Arc::new(registry))
    }

    fn ints(rows: &[Row]) -> Vec<i64> {
        rows.iter().filter_map(|r| r.values()[0].as_int64()).collect()
    }

    #[test]
    fn test_result_meta_shape() {
        let query = sql::parse("SELECT n FROM numbers WHERE n > 2 LIMIT 5").unwrap();
        let schema = RowSchema::new(vec![ColumnMeta::new("n", LogicalType::Int64)]);
        let (meta, output) = result_meta("numbers", schema.clone(), &query, 3);
        let names: Vec<&str> = meta.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["input", "where", "select", "limit"]);
        assert_eq!(output, "limit");
        assert_eq!(meta.steps[3].kind, StepKind::Limit { count: 3 });

        let query = sql::parse("SELECT * FROM numbers").unwrap();
        let (meta, output) = result_meta("numbers", schema, &query, 0);
        assert_eq!(meta.steps.len(), 2);
        assert_eq!(output, "select");
    }

    #[test]
    fn test_execute_filters_and_projects() {
        let executor = executor(numbers(Some(10)), Config::default());
        let stream = executor.execute("SELECT n FROM numbers WHERE n >= 8", 0).unwrap();
        assert_eq!(stream.schema().names(), vec!["n"]);
        assert!(stream.service_pipeline_id().starts_with("service-"));
        assert!(stream.result_pipeline_id().starts_with("result-"));
        let rows = stream.collect_rows().unwrap();
        assert_eq!(ints(&rows), vec![8, 9, 10]);
    }

    #[test]
    fn test_query_limit_and_max_rows() {
        let executor = executor(numbers(None), Config::default());
        let rows = executor
            .execute("SELECT * FROM numbers LIMIT 4", 0)
            .unwrap()
            .collect_rows()
            .unwrap();
        assert_eq!(ints(&rows), vec![1, 2, 3, 4]);

        let stream = executor.execute("SELECT * FROM numbers LIMIT 40", 6).unwrap();
        let rows: Vec<Row> = stream.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn test_max_rows_counts_rows_after_where() {
        let executor = executor(numbers(None), Config::default());
        let mut stream = executor.execute("SELECT n FROM numbers WHERE n > 50", 10).unwrap();
        let rows: Vec<Row> = stream.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(ints(&rows), (51..=60).collect::<Vec<_>>());
        assert!(stream.truncated());

        let mut stream = executor.execute("SELECT n FROM numbers LIMIT 3", 10).unwrap();
        assert_eq!(stream.by_ref().count(), 3);
        assert!(!stream.truncated());
    }

    #[test]
    fn test_binding_row_cap() {
        assert_eq!(binding_row_cap(None, 10), 10);
        assert_eq!(binding_row_cap(Some(5), 10), 0);
        assert_eq!(binding_row_cap(Some(50), 10), 10);
        assert_eq!(binding_row_cap(Some(5), 0), 0);
    }

    #[test]
    fn test_configured_limit_cuts_service_off() {
        let executor = executor(numbers(None), Config::default().with_row_limit(5));
        let mut stream = executor
            .execute_with_options("SELECT n FROM numbers WHERE n > 2", &QueryOptions::new())
            .unwrap();
        let rows: Vec<Row> = stream.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(ints(&rows), vec![3, 4, 5]);
        assert!(stream.truncated());
    }

    #[test]
    fn test_unknown_service_and_column() {
        let executor = executor(numbers(Some(1)), Config::default());
        assert!(matches!(
            executor.execute("SELECT * FROM nobody", 0),
            Err(Error::ServiceNotFound(name)) if name == "nobody"
        ));
        assert!(matches!(
            executor.execute("SELECT missing FROM numbers", 0),
            Err(Error::Query(q)) if q.kind == QueryErrorKind::Semantic
        ));
        assert!(matches!(
            executor.execute("SELECT * FROM numbers WHERE missing = 1", 0),
            Err(Error::Query(_))
        ));
    }

    #[test]
    fn test_missing_service_step() {
        let mut service = numbers(Some(1));
        service.step_name = "gone".to_string();
        let executor = executor(service, Config::default());
        assert!(matches!(
            executor.execute("SELECT * FROM numbers", 0),
            Err(Error::StepNotAccessible { step, .. }) if step == "gone"
        ));
    }

    #[test]
    fn test_time_limit_truncates() {
        let executor = executor(numbers(None), Config::default().with_row_limit(0));
        let options = QueryOptions::new().with_time_limit(Duration::from_millis(50));
        let mut stream = executor.execute_with_options("SELECT * FROM numbers", &options).unwrap();
        let mut count = 0u64;
        for row in stream.by_ref() {
            row.unwrap();
            count += 1;
        }
        assert!(count > 0);
        assert!(stream.truncated());
    }

    #[test]
    fn test_runtime_failure_ends_stream_with_error() {
        let service = ServiceDefinition::new(
            "bad",
            PipelineMeta::new("bad").with_step(
                "docs",
                StepKind::Documents {
                    fields: vec![DocumentField::new("n", LogicalType::Int64)],
                    documents: vec![serde_json::json!({"n": 1}), serde_json::json!({"n": {"deep": 2}})],
                    query: None,
                },
            ),
            "docs",
        );
        let executor = executor(service, Config::default());
        let items: Vec<Result<Row>> = executor.execute("SELECT * FROM bad", 0).unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(&items[1], Err(Error::Pipeline(_))));
    }

    #[test]
    fn test_explain_without_optimizations() {
        let executor = executor(numbers(Some(3)), Config::default());
        let explanation = executor.explain("SELECT * FROM numbers", &QueryOptions::new()).unwrap();
        assert_eq!(explanation.service, "numbers");
        assert_eq!(explanation.step, "seq");
        assert_eq!(explanation.schema.names(), vec!["n"]);
        assert!(explanation.optimizations.is_empty());
    }
}
