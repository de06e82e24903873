//! Optimizations seen through the executor: caching, predicate push-down,
//! parameter push-down and previews.

mod common;

use common::{executor, executor_for, registry, strings};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Duration;
use tapline_adapters::cache::{CacheManager, MemoryCacheManager};
use tapline_adapters::plugins::{CACHE_MANAGER, ProviderRegistry};
use tapline_engine::{Config, QueryExecutor, QueryOptions};

#[test]
fn test_second_full_scan_served_from_cache() {
    let executor = executor(Config::default());

    let first = executor.execute("SELECT * FROM people", 0).unwrap();
    assert!(!first.from_cache());
    let first_schema = first.schema().clone();
    let first_rows = first.collect_rows().unwrap();

    for _ in 0..2 {
        let again = executor.execute("SELECT * FROM people", 0).unwrap();
        assert!(again.from_cache());
        assert_eq!(again.schema(), &first_schema);
        assert_eq!(again.collect_rows().unwrap(), first_rows);
    }
}

#[test]
fn test_cached_rows_still_filtered_per_query() {
    let executor = executor(Config::default());
    executor.execute("SELECT * FROM people", 0).unwrap().collect_rows().unwrap();

    let stream = executor.execute("SELECT name FROM people WHERE city = 'Oslo'", 0).unwrap();
    assert!(stream.from_cache());
    assert_eq!(strings(&stream.collect_rows().unwrap(), 0), vec!["ann", "cid"]);
}

#[test]
fn test_pushed_down_run_is_not_cached() {
    let executor = executor(Config::default());
    let rows = executor
        .execute("SELECT name FROM people WHERE city = 'Oslo'", 0)
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(strings(&rows, 0), vec!["ann", "cid"]);

    let full = executor.execute("SELECT * FROM people", 0).unwrap();
    assert!(!full.from_cache());
}

#[test]
fn test_truncated_run_is_not_cached() {
    let executor = executor(Config::default().with_row_limit(2));
    let mut cut = executor
        .execute_with_options("SELECT * FROM people", &QueryOptions::new())
        .unwrap();
    assert_eq!(cut.by_ref().count(), 2);
    assert!(cut.truncated());
    drop(cut);

    let full = executor.execute("SELECT * FROM people", 0).unwrap();
    assert!(!full.from_cache());
    assert_eq!(full.collect_rows().unwrap().len(), 4);
}

#[test]
fn test_pushdown_matches_unoptimized_results() {
    let executor = executor(Config::default());
    let queries = [
        "SELECT name FROM people WHERE age > 20 AND age <= 31",
        "SELECT name FROM people WHERE city IN ('Rome', 'Paris') OR age = 19",
        "SELECT name FROM people WHERE name LIKE 'c%'",
        "SELECT name FROM people WHERE city <> 'Oslo'",
    ];
    let expected = [vec!["ann", "bob"], vec!["bob", "dee"], vec!["cid"], vec!["bob"]];
    for (query, expected) in queries.iter().zip(expected) {
        let rows = executor.execute(query, 0).unwrap().collect_rows().unwrap();
        assert_eq!(strings(&rows, 0), expected, "{query}");
    }
}

#[test]
fn test_untranslatable_predicate_falls_back_to_full_scan() {
    let executor = executor(Config::default());
    let rows = executor
        .execute("SELECT name FROM people WHERE NOT (age = 31 OR age = 40)", 0)
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(strings(&rows, 0), vec!["bob", "dee"]);
}

#[test]
fn test_parameter_derived_from_where_clause() {
    let executor = executor(Config::default());
    let rows = executor
        .execute("SELECT name FROM lookup WHERE city = 'Rome'", 0)
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(strings(&rows, 0), vec!["bob"]);
}

/// A cached lookup whose cache key leaves caller parameters out.
const DIRECTORY: &str = r#"{
  "services": [
    {
      "name": "directory",
      "step": "scan",
      "pipeline": {"name": "directory", "steps": [{
        "name": "scan", "kind": "documents",
        "fields": [{"name": "name", "type": "string"}, {"name": "city", "type": "string"}],
        "documents": [
          {"name": "ann", "city": "Oslo"}, {"name": "bob", "city": "Rome"}, {"name": "cid", "city": "Oslo"}
        ],
        "query": "{\"city\": \"${CITY_PARAM}\"}"
      }]},
      "optimizations": [
        {"name": "city", "step": "scan", "type": "parameter_pushdown", "definitions": [{"column": "city"}]},
        {"name": "cache", "step": "scan", "type": "service_cache", "ttl": "1h"}
      ]
    }
  ]
}"#;

#[test]
fn test_where_derived_parameter_keys_the_cache() {
    let executor = executor_for(DIRECTORY, Config::default());
    let query = |city: &str| {
        let stream = executor
            .execute(&format!("SELECT name FROM directory WHERE city = '{city}'"), 0)
            .unwrap();
        let from_cache = stream.from_cache();
        (from_cache, strings(&stream.collect_rows().unwrap(), 0))
    };

    assert_eq!(query("Oslo"), (false, vec!["ann".to_string(), "cid".to_string()]));
    assert_eq!(query("Rome"), (false, vec!["bob".to_string()]));
    assert_eq!(query("Oslo"), (true, vec!["ann".to_string(), "cid".to_string()]));
    assert_eq!(query("Rome"), (true, vec!["bob".to_string()]));
}

#[test]
fn test_quote_in_derived_parameter_is_a_plain_value() {
    let executor = executor(Config::default());
    let rows = executor
        .execute(r#"SELECT name FROM lookup WHERE city = 'O"slo'"#, 0)
        .unwrap()
        .collect_rows()
        .unwrap();
    assert!(rows.is_empty());

    let rows = executor
        .execute(r#"SELECT name FROM lookup WHERE city = 'x", "name": {"$ne": "'"#, 0)
        .unwrap()
        .collect_rows()
        .unwrap();
    assert!(rows.is_empty());
}

const MIXED_TYPES: &str = r#"{
  "services": [
    {
      "name": "pushed",
      "step": "scan",
      "pipeline": {"name": "pushed", "steps": [{
        "name": "scan", "kind": "documents",
        "fields": [{"name": "age", "type": "int64"}, {"name": "code", "type": "string"}],
        "documents": [
          {"age": "30", "code": 7}, {"age": 10, "code": "7"}, {"age": 30.0, "code": true}, {"code": "x"}
        ]
      }]},
      "optimizations": [{"name": "pushdown", "step": "scan", "type": "predicate_pushdown"}]
    },
    {
      "name": "plain",
      "step": "scan",
      "pipeline": {"name": "plain", "steps": [{
        "name": "scan", "kind": "documents",
        "fields": [{"name": "age", "type": "int64"}, {"name": "code", "type": "string"}],
        "documents": [
          {"age": "30", "code": 7}, {"age": 10, "code": "7"}, {"age": 30.0, "code": true}, {"code": "x"}
        ]
      }]}
    }
  ]
}"#;

#[test]
fn test_pushdown_agrees_with_plain_scan_on_mixed_types() {
    let executor = executor_for(MIXED_TYPES, Config::default());
    let predicates = [
        "age > 20",
        "age = 30",
        "age IN (10, 30)",
        "code = '7'",
        "code LIKE 't%'",
        "age <> 10",
    ];
    for predicate in predicates {
        let run = |service: &str| {
            executor
                .execute(&format!("SELECT age, code FROM {service} WHERE {predicate}"), 0)
                .unwrap()
                .collect_rows()
                .unwrap()
        };
        let plain = run("plain");
        assert!(!plain.is_empty(), "{predicate}");
        assert_eq!(run("pushed"), plain, "{predicate}");
    }
}

#[test]
fn test_explicit_parameter_wins() {
    let executor = executor(Config::default());
    let mut params = IndexMap::new();
    params.insert("CITY_PARAM".to_string(), "Oslo".to_string());
    let rows = executor
        .execute_with_params("SELECT name FROM lookup", params)
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(strings(&rows, 0), vec!["ann"]);
}

#[test]
fn test_explain_reports_each_optimization() {
    let executor = executor(Config::default());
    let explanation = executor
        .explain("SELECT * FROM people WHERE city = 'Oslo'", &QueryOptions::new())
        .unwrap();
    assert_eq!(explanation.service, "people");
    assert_eq!(explanation.step, "scan");
    let names: Vec<&str> = explanation.optimizations.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["cache", "pushdown"]);

    let pushdown = &explanation.optimizations[1];
    assert!(pushdown.errors.is_empty());
    let filter: serde_json::Value = serde_json::from_str(&pushdown.after).unwrap();
    assert_eq!(filter, serde_json::json!({"address.city": {"$eq": "Oslo"}}));

    // Explaining executes nothing, so the cache stays cold.
    assert!(!executor.execute("SELECT * FROM people", 0).unwrap().from_cache());
}

#[test]
fn test_late_cache_provider() {
    let providers: Arc<ProviderRegistry<dyn CacheManager>> = Arc::new(ProviderRegistry::new());
    let config = Config::default().with_provider_timeout(Duration::from_secs(5));
    let executor = QueryExecutor::with_providers(config, Arc::new(registry()), Arc::clone(&providers));

    let late = Arc::clone(&providers);
    let registrar = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        late.register(CACHE_MANAGER, Arc::new(MemoryCacheManager::new()));
    });

    let first = executor.execute("SELECT * FROM people", 0).unwrap();
    assert!(!first.from_cache());
    first.collect_rows().unwrap();
    registrar.join().unwrap();
    assert!(executor.execute("SELECT * FROM people", 0).unwrap().from_cache());
}

#[test]
fn test_missing_cache_provider_degrades() {
    let providers: Arc<ProviderRegistry<dyn CacheManager>> = Arc::new(ProviderRegistry::new());
    let config = Config::default().with_provider_timeout(Duration::from_millis(10));
    let executor = QueryExecutor::with_providers(config, Arc::new(registry()), providers);
    for _ in 0..2 {
        let stream = executor.execute("SELECT * FROM people", 0).unwrap();
        assert!(!stream.from_cache());
        assert_eq!(stream.count(), 4);
    }
}
