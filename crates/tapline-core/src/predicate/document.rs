//! Mongo-style document filters.
//!
//! Conditions become JSON filter documents such as
//! `{"$and": [{"city": {"$eq": "Oslo"}}, {"age": {"$gt": 30}}]}`. The
//! `Documents` pipeline step evaluates these filters natively.

use super::{OperatorTable, ResolvedOperand, TargetDialect};
use crate::condition::Connector;
use crate::condition::Operator;
use crate::condition::eval::like_to_regex;
use indexmap::IndexMap;
use serde_json::{Map, Value as Json, json};
use tapline_common::utils::error::PredicateError;

/// Translates conditions into Mongo-style JSON filters.
pub struct DocumentDialect {
    operators: OperatorTable<Json>,
    field_mapping: Option<IndexMap<String, String>>,
}

impl DocumentDialect {
    /// Creates a dialect that uses column names as document fields.
    #[must_use]
    pub fn new() -> Self {
        Self {
            operators: OperatorTable::new()
                .negatable(Operator::Eq, eq, ne)
                .negatable(Operator::Neq, ne, eq)
                .negatable(Operator::In, within, not_within)
                .affirm(Operator::Lt, lt)
                .affirm(Operator::Lte, lte)
                .affirm(Operator::Gt, gt)
                .affirm(Operator::Gte, gte)
                .affirm(Operator::Like, regex),
            field_mapping: None,
        }
    }

    /// Maps service columns to document field paths.
    ///
    /// Once a mapping is set, conditions on columns it does not name cannot
    /// be translated.
    #[must_use]
    pub fn with_field_mapping(mut self, mapping: IndexMap<String, String>) -> Self {
        self.field_mapping = Some(mapping);
        self
    }
}

impl Default for DocumentDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetDialect for DocumentDialect {
    type Expr = Json;

    fn name(&self) -> &str {
        "document"
    }

    fn operators(&self) -> &OperatorTable<Json> {
        &self.operators
    }

    fn attribute(&self, column: &str) -> Result<String, PredicateError> {
        match &self.field_mapping {
            None => Ok(column.to_string()),
            Some(mapping) => mapping
                .get(column)
                .or_else(|| {
                    mapping
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(column))
                        .map(|(_, v)| v)
                })
                .cloned()
                .ok_or_else(|| PredicateError::UnmappedColumn(column.to_string())),
        }
    }

    fn not(&self, expr: Json) -> Json {
        // `{field: {$op: v}}` negates in place; anything else goes under $nor.
        if let Json::Object(map) = &expr {
            if map.len() == 1 {
                if let Some((field, Json::Object(ops))) = map.iter().next() {
                    if !field.starts_with('$') && ops.keys().all(|k| k.starts_with('$')) {
                        return field_op(field, "$not", Json::Object(ops.clone()));
                    }
                }
            }
        }
        json!({ "$nor": [expr] })
    }

    fn combine(&self, connector: Connector, children: Vec<Json>) -> Json {
        let key = match connector {
            Connector::And => "$and",
            Connector::Or => "$or",
        };
        let mut map = Map::new();
        map.insert(key.to_string(), Json::Array(children));
        Json::Object(map)
    }
}

fn operand_json(operand: &ResolvedOperand) -> Json {
    match operand {
        ResolvedOperand::Value(value) => value.to_json(),
        ResolvedOperand::List(values) => Json::Array(values.iter().map(|v| v.to_json()).collect()),
    }
}

fn field_op(field: &str, op: &str, operand: Json) -> Json {
    let mut ops = Map::new();
    ops.insert(op.to_string(), operand);
    let mut doc = Map::new();
    doc.insert(field.to_string(), Json::Object(ops));
    Json::Object(doc)
}

fn eq(field: &str, operand: &ResolvedOperand) -> Json {
    field_op(field, "$eq", operand_json(operand))
}

fn ne(field: &str, operand: &ResolvedOperand) -> Json {
    field_op(field, "$ne", operand_json(operand))
}

fn lt(field: &str, operand: &ResolvedOperand) -> Json {
    field_op(field, "$lt", operand_json(operand))
}

fn lte(field: &str, operand: &ResolvedOperand) -> Json {
    field_op(field, "$lte", operand_json(operand))
}

fn gt(field: &str, operand: &ResolvedOperand) -> Json {
    field_op(field, "$gt", operand_json(operand))
}

fn gte(field: &str, operand: &ResolvedOperand) -> Json {
    field_op(field, "$gte", operand_json(operand))
}

fn as_list(operand: &ResolvedOperand) -> Json {
    match operand {
        ResolvedOperand::Value(value) => Json::Array(vec![value.to_json()]),
        list => operand_json(list),
    }
}

fn within(field: &str, operand: &ResolvedOperand) -> Json {
    field_op(field, "$in", as_list(operand))
}

fn not_within(field: &str, operand: &ResolvedOperand) -> Json {
    field_op(field, "$nin", as_list(operand))
}

fn regex(field: &str, operand: &ResolvedOperand) -> Json {
    let pattern = match operand {
        ResolvedOperand::Value(value) => value.to_string(),
        ResolvedOperand::List(values) => values
            .first()
            .map(ToString::to_string)
            .unwrap_or_default(),
    };
    field_op(field, "$regex", Json::String(like_to_regex(&pattern)))
}
