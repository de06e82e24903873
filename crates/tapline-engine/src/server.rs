//! The server façade.
//!
//! A [`Server`] owns a [`QueryExecutor`] over a service catalog and writes
//! query results in the service stream format.

use crate::config::Config;
use crate::executor::{QueryExecutor, QueryOptions};
use crate::service::{MemoryServiceRegistry, ServiceRegistry};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tapline_adapters::protocol::{ServiceStreamWriter, StreamHeader};
use tapline_common::utils::error::Result;

/// Serves SQL queries over a set of services.
pub struct Server {
    executor: QueryExecutor,
}

impl Server {
    /// Wraps an executor.
    #[must_use]
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    /// Loads a service catalog and serves it with `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or names a service
    /// twice.
    pub fn open(catalog: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate()?;
        let registry = MemoryServiceRegistry::load(catalog)?;
        tracing::info!(services = registry.len(), "service catalog loaded");
        Ok(Self::new(QueryExecutor::new(config, Arc::new(registry))))
    }

    /// Returns the executor.
    #[must_use]
    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Returns the names of the served services.
    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        self.executor.registry().names()
    }

    /// Executes `query` and writes the result stream to `writer`.
    ///
    /// Returns the writer and the number of rows written. The header is
    /// written before the first row, so a query with no rows still yields a
    /// complete stream. If the query fails after the header went out the
    /// stream is left without its end marker and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the writer does.
    pub fn stream<W: Write>(&self, query: &str, options: &QueryOptions, writer: W) -> Result<(W, u64)> {
        let rows = self.executor.execute_with_options(query, options)?;
        let header = StreamHeader {
            service_name: rows.service_name().to_string(),
            service_pipeline_id: rows.service_pipeline_id().to_string(),
            result_pipeline_id: rows.result_pipeline_id().to_string(),
            schema: rows.schema().clone(),
        };
        let mut out = ServiceStreamWriter::new(writer);
        out.write_header(&header)?;
        for row in rows {
            out.write_row(&row?)?;
        }
        let written = out.rows_written();
        let writer = out.finish()?;
        tracing::debug!(service = %header.service_name, rows = written, "result stream written");
        Ok((writer, written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tapline_adapters::protocol::ServiceStreamReader;

    const CATALOG: &str = r#"{
        "services": [
            {
                "name": "numbers",
                "step": "seq",
                "pipeline": {
                    "name": "numbers",
                    "steps": [{"name": "seq", "kind": "sequence", "column": "n", "start": 1, "count": 5}]
                }
            }
        ]
    }"#;

    fn server() -> Server {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();
        Server::open(file.path(), Config::default()).unwrap()
    }

    #[test]
    fn test_open_lists_services() {
        assert_eq!(server().service_names(), vec!["numbers"]);
    }

    #[test]
    fn test_stream_round_trip() {
        let server = server();
        let (bytes, written) = server
            .stream("SELECT n FROM numbers WHERE n > 2", &QueryOptions::new(), Vec::new())
            .unwrap();
        assert_eq!(written, 3);

        let mut reader = ServiceStreamReader::new(bytes.as_slice());
        let header = reader.read_header().unwrap();
        assert_eq!(header.service_name, "numbers");
        assert!(header.service_pipeline_id.starts_with("service-"));
        assert!(header.result_pipeline_id.starts_with("result-"));
        assert_eq!(header.schema.names(), vec!["n"]);
        let values: Vec<i64> = reader
            .rows()
            .map(|r| r.unwrap().values()[0].as_int64().unwrap())
            .collect();
        assert_eq!(values, vec![3, 4, 5]);
    }

    #[test]
    fn test_empty_result_keeps_schema() {
        let (bytes, written) = server()
            .stream("SELECT * FROM numbers WHERE n > 100", &QueryOptions::new(), Vec::new())
            .unwrap();
        assert_eq!(written, 0);
        let mut reader = ServiceStreamReader::new(bytes.as_slice());
        assert_eq!(reader.read_header().unwrap().schema.len(), 1);
        assert!(reader.next_row().unwrap().is_none());
    }

    #[test]
    fn test_unknown_service_writes_nothing() {
        let result = server().stream("SELECT * FROM other", &QueryOptions::new(), Vec::new());
        assert!(result.is_err());
    }
}
