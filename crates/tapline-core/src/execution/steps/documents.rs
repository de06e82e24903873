//! JSON document scan.
//!
//! The scan applies a Mongo-style filter to every document before extracting
//! columns, so a pushed-down predicate keeps non-matching documents from
//! ever becoming rows. Supported operators: `$and`, `$or`, `$nor`, `$eq`,
//! `$ne`, `$lt`, `$lte`, `$gt`, `$gte`, `$in`, `$nin`, `$regex` and `$not`.
//! A bare value (`{"city": "Oslo"}`) means `$eq`.
//!
//! Field semantics follow the document store convention: `$ne`, `$nin` and
//! `$not` match documents where the field is missing, ordering operators
//! never do.
//!
//! Declared fields are converted to their logical type before the filter
//! runs, so the filter sees the same values the rows will carry. A document
//! whose value does not fit its field's type fails the scan whether or not
//! the filter would have kept it.

use super::RowSource;
use crate::condition::resolver::coerce_json;
use crate::execution::PipelineError;
use crate::execution::meta::DocumentField;
use regex::Regex;
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::sync::atomic::AtomicBool;
use tapline_common::types::{Row, Value};

/// A compiled document filter.
#[derive(Debug, Clone)]
pub enum DocumentFilter {
    /// Matches every document.
    All,
    /// All children match.
    And(Vec<DocumentFilter>),
    /// Any child matches.
    Or(Vec<DocumentFilter>),
    /// No child matches.
    Nor(Vec<DocumentFilter>),
    /// A test on one field.
    Field {
        /// Dotted path.
        path: String,
        /// Tests that must all hold.
        tests: Vec<FieldTest>,
    },
}

/// A single operator applied to a field value.
#[derive(Debug, Clone)]
pub enum FieldTest {
    /// `$eq`
    Eq(Json),
    /// `$ne`
    Ne(Json),
    /// `$lt`, `$lte`, `$gt`, `$gte`
    Compare(&'static str, Json),
    /// `$in`
    In(Vec<Json>),
    /// `$nin`
    Nin(Vec<Json>),
    /// `$regex`
    Regex(Regex),
    /// `$not`
    Not(Vec<FieldTest>),
}

impl DocumentFilter {
    /// Compiles a filter document.
    ///
    /// # Errors
    ///
    /// Returns a description of the first malformed clause.
    pub fn compile(filter: &Json) -> Result<Self, String> {
        let Json::Object(map) = filter else {
            return Err(format!("filter must be an object, got {filter}"));
        };
        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            clauses.push(match key.as_str() {
                "$and" => Self::And(compile_list(key, value)?),
                "$or" => Self::Or(compile_list(key, value)?),
                "$nor" => Self::Nor(compile_list(key, value)?),
                op if op.starts_with('$') => return Err(format!("unknown operator '{op}'")),
                path => Self::Field {
                    path: path.to_string(),
                    tests: compile_tests(value)?,
                },
            });
        }
        Ok(match clauses.len() {
            0 => Self::All,
            1 => clauses.pop().unwrap_or(Self::All),
            _ => Self::And(clauses),
        })
    }

    /// Tests a document as stored.
    #[must_use]
    pub fn matches(&self, document: &Json) -> bool {
        self.matches_view(&DocumentView {
            raw: document,
            typed: Vec::new(),
        })
    }

    fn matches_view(&self, view: &DocumentView<'_>) -> bool {
        match self {
            Self::All => true,
            Self::And(children) => children.iter().all(|c| c.matches_view(view)),
            Self::Or(children) => children.iter().any(|c| c.matches_view(view)),
            Self::Nor(children) => !children.iter().any(|c| c.matches_view(view)),
            Self::Field { path, tests } => {
                let value = view.get(path);
                tests.iter().all(|t| t.matches(value))
            }
        }
    }
}

/// A document with its declared fields replaced by their typed values.
struct DocumentView<'a> {
    raw: &'a Json,
    typed: Vec<(&'a str, Json)>,
}

impl DocumentView<'_> {
    fn get(&self, path: &str) -> Option<&Json> {
        match self.typed.iter().find(|(typed_path, _)| *typed_path == path) {
            Some((_, value)) => Some(value),
            None => lookup(self.raw, path),
        }
    }
}

fn compile_list(key: &str, value: &Json) -> Result<Vec<DocumentFilter>, String> {
    let Json::Array(items) = value else {
        return Err(format!("'{key}' expects an array"));
    };
    items.iter().map(DocumentFilter::compile).collect()
}

fn compile_tests(value: &Json) -> Result<Vec<FieldTest>, String> {
    let ops = match value {
        Json::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => ops,
        literal => return Ok(vec![FieldTest::Eq(literal.clone())]),
    };
    let mut tests = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        tests.push(match op.as_str() {
            "$eq" => FieldTest::Eq(operand.clone()),
            "$ne" => FieldTest::Ne(operand.clone()),
            "$lt" => FieldTest::Compare("$lt", operand.clone()),
            "$lte" => FieldTest::Compare("$lte", operand.clone()),
            "$gt" => FieldTest::Compare("$gt", operand.clone()),
            "$gte" => FieldTest::Compare("$gte", operand.clone()),
            "$in" | "$nin" => {
                let Json::Array(items) = operand else {
                    return Err(format!("'{op}' expects an array"));
                };
                if op == "$in" {
                    FieldTest::In(items.clone())
                } else {
                    FieldTest::Nin(items.clone())
                }
            }
            "$regex" => {
                let Json::String(pattern) = operand else {
                    return Err("'$regex' expects a string".to_string());
                };
                FieldTest::Regex(Regex::new(pattern).map_err(|e| e.to_string())?)
            }
            "$not" => FieldTest::Not(compile_tests(operand)?),
            other => return Err(format!("unknown operator '{other}'")),
        });
    }
    Ok(tests)
}

impl FieldTest {
    fn matches(&self, value: Option<&Json>) -> bool {
        match self {
            Self::Eq(expected) => json_eq(value.unwrap_or(&Json::Null), expected),
            Self::Ne(expected) => !json_eq(value.unwrap_or(&Json::Null), expected),
            Self::Compare(op, bound) => {
                let Some(ordering) = value.and_then(|v| json_cmp(v, bound)) else {
                    return false;
                };
                match *op {
                    "$lt" => ordering == Ordering::Less,
                    "$lte" => ordering != Ordering::Greater,
                    "$gt" => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }
            }
            Self::In(items) => {
                let value = value.unwrap_or(&Json::Null);
                items.iter().any(|item| json_eq(value, item))
            }
            Self::Nin(items) => {
                let value = value.unwrap_or(&Json::Null);
                !items.iter().any(|item| json_eq(value, item))
            }
            Self::Regex(regex) => value
                .and_then(display_text)
                .is_some_and(|text| regex.is_match(&text)),
            Self::Not(tests) => !tests.iter().all(|t| t.matches(value)),
        }
    }
}

/// Renders a scalar the way a row value displays, for pattern matching.
fn display_text(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Bool(b) => Some(b.to_string()),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Some(i.to_string()),
            None => n.as_f64().map(|f| f.to_string()),
        },
        _ => None,
    }
}

fn json_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn json_cmp(a: &Json, b: &Json) -> Option<Ordering> {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Json::String(x), Json::String(y)) => Some(x.cmp(y)),
        (Json::Bool(x), Json::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Follows a dotted path through nested objects.
fn lookup<'a>(document: &'a Json, path: &str) -> Option<&'a Json> {
    path.split('.').try_fold(document, |current, key| current.get(key))
}

/// Scans documents, filtering and extracting columns.
pub struct DocumentScan {
    step: String,
    fields: Vec<DocumentField>,
    documents: std::vec::IntoIter<Json>,
    filter: DocumentFilter,
}

impl DocumentScan {
    /// Creates a scan.
    ///
    /// # Errors
    ///
    /// Returns an error if `query` is not valid JSON or not a valid filter.
    pub fn new(
        step: &str,
        fields: Vec<DocumentField>,
        documents: Vec<Json>,
        query: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let step_error = |message: String| PipelineError::Step {
            step: step.to_string(),
            message,
        };
        let filter = match query.map(str::trim).filter(|q| !q.is_empty()) {
            None => DocumentFilter::All,
            Some(text) => {
                let json: Json = serde_json::from_str(text)
                    .map_err(|e| step_error(format!("query is not valid JSON: {e}")))?;
                DocumentFilter::compile(&json).map_err(|e| step_error(format!("invalid query: {e}")))?
            }
        };
        Ok(Self {
            step: step.to_string(),
            fields,
            documents: documents.into_iter(),
            filter,
        })
    }
}

impl RowSource for DocumentScan {
    fn next_row(&mut self, _stop: &AtomicBool) -> Result<Option<Row>, PipelineError> {
        for document in self.documents.by_ref() {
            let values = self
                .fields
                .iter()
                .map(|field| match lookup(&document, field.path()) {
                    None => Ok(Value::Null),
                    Some(json) => coerce_json(json, field.logical_type),
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| PipelineError::Step {
                    step: self.step.clone(),
                    message: e.to_string(),
                })?;
            if !matches!(self.filter, DocumentFilter::All) {
                let view = DocumentView {
                    raw: &document,
                    typed: self
                        .fields
                        .iter()
                        .zip(&values)
                        .map(|(field, value)| (field.path(), value.to_json()))
                        .collect(),
                };
                if !self.filter.matches_view(&view) {
                    continue;
                }
            }
            return Ok(Some(Row::new(values)));
        }
        Ok(None)
    }
}
