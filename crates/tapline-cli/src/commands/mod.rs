//! CLI command implementations.

pub mod explain;
pub mod query;
pub mod services;
pub mod stream;
pub mod validate;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use indexmap::IndexMap;
use tapline_engine::{Config, QueryOptions, Server};

use crate::{OutputFormat, QueryArgs};

/// Global options every command sees.
pub struct Context {
    pub catalog: PathBuf,
    pub config: Option<PathBuf>,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl Context {
    /// Loads the configuration file, or the defaults.
    pub fn config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display())),
            None => Ok(Config::default()),
        }
    }

    /// Opens a server over the catalog.
    pub fn server(&self) -> Result<Server> {
        let config = self.config()?;
        Server::open(&self.catalog, config)
            .with_context(|| format!("opening catalog {}", self.catalog.display()))
    }
}

/// Parses `NAME=VALUE`.
pub fn parse_param(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

/// Builds per-query options from the command line.
pub fn query_options(args: &QueryArgs) -> Result<QueryOptions> {
    let mut params = IndexMap::new();
    for (name, value) in &args.params {
        if params.insert(name.clone(), value.clone()).is_some() {
            bail!("parameter '{name}' given twice");
        }
    }
    let mut options = QueryOptions::new().with_params(params);
    if let Some(rows) = args.max_rows {
        options = options.with_max_rows(rows);
    }
    if let Some(ms) = args.time_limit_ms {
        options = options.with_time_limit(Duration::from_millis(ms));
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("CITY=Oslo").unwrap(), ("CITY".to_string(), "Oslo".to_string()));
        assert_eq!(parse_param("Q=a=b").unwrap(), ("Q".to_string(), "a=b".to_string()));
        assert_eq!(parse_param("EMPTY=").unwrap(), ("EMPTY".to_string(), String::new()));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_query_options() {
        let args = QueryArgs {
            sql: "SELECT * FROM t".to_string(),
            max_rows: Some(10),
            time_limit_ms: Some(0),
            params: vec![("A".to_string(), "1".to_string())],
        };
        let options = query_options(&args).unwrap();
        assert_eq!(options.max_rows, Some(10));
        assert_eq!(options.time_limit, Some(Duration::ZERO));
        assert_eq!(options.params.get("A").map(String::as_str), Some("1"));

        let twice = QueryArgs {
            params: vec![("A".to_string(), "1".to_string()), ("A".to_string(), "2".to_string())],
            ..args
        };
        assert!(query_options(&twice).is_err());
    }
}
