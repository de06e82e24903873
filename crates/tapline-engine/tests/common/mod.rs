//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use tapline_common::types::Row;
use tapline_engine::{Config, MemoryServiceRegistry, QueryExecutor, ServiceCatalog};

/// A catalog with a document-backed `people` service, a parameterized
/// lookup and an endless counter.
pub const CATALOG: &str = r#"{
  "services": [
    {
      "name": "people",
      "step": "scan",
      "pipeline": {
        "name": "people",
        "steps": [
          {
            "name": "scan",
            "kind": "documents",
            "fields": [
              {"name": "name", "type": "string"},
              {"name": "age", "type": "int64"},
              {"name": "city", "type": "string", "path": "address.city"}
            ],
            "documents": [
              {"name": "ann", "age": 31, "address": {"city": "Oslo"}},
              {"name": "bob", "age": 25, "address": {"city": "Rome"}},
              {"name": "cid", "age": 40, "address": {"city": "Oslo"}},
              {"name": "dee", "age": 19}
            ]
          }
        ]
      },
      "optimizations": [
        {"name": "cache", "step": "scan", "type": "service_cache", "ttl": "10m"},
        {"name": "pushdown", "step": "scan", "type": "predicate_pushdown"}
      ]
    },
    {
      "name": "lookup",
      "step": "scan",
      "pipeline": {
        "name": "lookup",
        "steps": [
          {
            "name": "scan",
            "kind": "documents",
            "fields": [
              {"name": "name", "type": "string"},
              {"name": "city", "type": "string"}
            ],
            "documents": [
              {"name": "ann", "city": "Oslo"},
              {"name": "bob", "city": "Rome"}
            ],
            "query": "{\"city\": \"${CITY_PARAM}\"}"
          }
        ]
      },
      "optimizations": [
        {"name": "city", "step": "scan", "type": "parameter_pushdown", "definitions": [{"column": "city"}]}
      ]
    },
    {
      "name": "counter",
      "step": "seq",
      "pipeline": {
        "name": "counter",
        "steps": [{"name": "seq", "kind": "sequence", "column": "n", "start": 1}]
      }
    }
  ]
}"#;

pub fn registry() -> MemoryServiceRegistry {
    let catalog = ServiceCatalog::from_json(CATALOG).unwrap();
    assert!(catalog.validate().is_empty(), "{:?}", catalog.validate());
    MemoryServiceRegistry::from_catalog(catalog).unwrap()
}

pub fn executor(config: Config) -> QueryExecutor {
    QueryExecutor::new(config, Arc::new(registry()))
}

/// Builds an executor over a catalog without validating it first.
pub fn executor_for(catalog: &str, config: Config) -> QueryExecutor {
    let catalog = ServiceCatalog::from_json(catalog).unwrap();
    QueryExecutor::new(config, Arc::new(MemoryServiceRegistry::from_catalog(catalog).unwrap()))
}

pub fn strings(rows: &[Row], column: usize) -> Vec<String> {
    rows.iter()
        .map(|r| r.values()[column].as_str().unwrap_or("<null>").to_string())
        .collect()
}

pub fn ints(rows: &[Row]) -> Vec<i64> {
    rows.iter().filter_map(|r| r.values()[0].as_int64()).collect()
}
