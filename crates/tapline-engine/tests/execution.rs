//! End-to-end query execution: cut-offs, ordering, stop propagation and
//! error reporting.

mod common;

use common::{executor, ints, strings};
use std::thread;
use std::time::Duration;
use tapline_common::types::Row;
use tapline_common::utils::error::{Error, QueryErrorKind};
use tapline_engine::{Config, QueryOptions};

#[test]
fn test_select_project_and_filter() {
    let executor = executor(Config::default());
    let stream = executor
        .execute("SELECT name, age FROM people WHERE age >= 25 AND age < 40", 0)
        .unwrap();
    assert_eq!(stream.schema().names(), vec!["name", "age"]);
    let rows = stream.collect_rows().unwrap();
    assert_eq!(strings(&rows, 0), vec!["ann", "bob"]);
}

#[test]
fn test_missing_document_field_is_null() {
    let executor = executor(Config::default());
    let rows = executor
        .execute("SELECT city FROM people WHERE name = 'dee'", 0)
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].values()[0].is_null());
}

#[test]
fn test_row_cutoff_bounds_unbounded_service() {
    let executor = executor(Config::default());
    for cutoff in [1, 7, 25] {
        let rows = executor.execute("SELECT * FROM counter", cutoff).unwrap().collect_rows().unwrap();
        assert_eq!(rows.len() as u64, cutoff);
        assert_eq!(ints(&rows), (1..=cutoff as i64).collect::<Vec<_>>());
    }
}

#[test]
fn test_configured_row_limit_applies_by_default() {
    let executor = executor(Config::default().with_row_limit(12));
    let stream = executor
        .execute_with_options("SELECT * FROM counter", &QueryOptions::new())
        .unwrap();
    assert_eq!(stream.count(), 12);
}

#[test]
fn test_query_limit_and_cutoff_smaller_wins() {
    let executor = executor(Config::default());
    let rows = executor.execute("SELECT * FROM counter LIMIT 3", 10).unwrap().collect_rows().unwrap();
    assert_eq!(ints(&rows), vec![1, 2, 3]);
    let rows = executor.execute("SELECT * FROM counter LIMIT 30", 5).unwrap().collect_rows().unwrap();
    assert_eq!(ints(&rows), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_max_rows_applies_after_where() {
    let executor = executor(Config::default());
    let rows = executor
        .execute("SELECT n FROM counter WHERE n > 50", 10)
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(ints(&rows), (51..=60).collect::<Vec<_>>());
}

#[test]
fn test_order_kept_with_small_queue_and_slow_consumer() {
    let config = Config::default().with_queue_capacity(2).with_result_buffer(1);
    let executor = executor(config);
    let stream = executor.execute("SELECT * FROM counter LIMIT 200", 0).unwrap();
    let mut seen = Vec::new();
    for row in stream {
        let row: Row = row.unwrap();
        if seen.len() % 20 == 0 {
            thread::sleep(Duration::from_millis(2));
        }
        seen.push(row.values()[0].as_int64().unwrap());
    }
    assert_eq!(seen, (1..=200).collect::<Vec<_>>());
}

#[test]
fn test_cancel_stops_unbounded_service() {
    let executor = executor(Config::default().with_row_limit(0));
    let mut stream = executor.execute_with_options("SELECT * FROM counter", &QueryOptions::new()).unwrap();
    for _ in 0..5 {
        stream.next().unwrap().unwrap();
    }
    stream.cancel();
    // Whatever was buffered drains, then the stream ends.
    let rest = stream.by_ref().take(100_000).count();
    assert!(rest < 100_000);
    assert!(stream.next().is_none());
}

#[test]
fn test_time_limit_truncates_gracefully() {
    let executor = executor(Config::default().with_row_limit(0));
    let options = QueryOptions::new().with_time_limit(Duration::from_millis(30));
    let mut stream = executor.execute_with_options("SELECT * FROM counter", &options).unwrap();
    let received = stream.by_ref().map(Result::unwrap).count();
    assert!(received > 0);
    assert!(stream.truncated());
}

#[test]
fn test_unknown_service() {
    let executor = executor(Config::default());
    let err = executor.execute("SELECT * FROM planets", 0).err().unwrap();
    assert!(matches!(err, Error::ServiceNotFound(ref name) if name == "planets"));
}

#[test]
fn test_unknown_column() {
    let executor = executor(Config::default());
    let err = executor.execute("SELECT height FROM people", 0).err().unwrap();
    assert!(matches!(err, Error::Query(ref q) if q.kind == QueryErrorKind::Semantic));
}

#[test]
fn test_syntax_error() {
    let executor = executor(Config::default());
    let err = executor.execute("SELECT FROM people", 0).err().unwrap();
    assert!(matches!(err, Error::Query(ref q) if q.kind == QueryErrorKind::Syntax));
}

#[test]
fn test_service_names_are_case_insensitive() {
    let executor = executor(Config::default());
    let stream = executor.execute("SELECT * FROM PEOPLE", 0).unwrap();
    assert_eq!(stream.service_name(), "people");
    assert_eq!(stream.count(), 4);
}
