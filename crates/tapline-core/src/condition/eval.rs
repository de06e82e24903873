//! Row-level evaluation of conditions.
//!
//! A condition is bound once against a schema: column names become positions
//! and literals are coerced to column types. The bound form then evaluates
//! rows without further lookups.

use super::resolver::ValueResolver;
use super::{Condition, Connector, Operand, Operator};
use regex::Regex;
use std::cmp::Ordering;
use tapline_common::types::{Row, RowSchema, Value};
use tapline_common::utils::error::{Error, QueryError, QueryErrorKind, Result};

/// A condition bound to column positions with typed literals.
#[derive(Debug, Clone)]
pub enum BoundCondition {
    /// A bound comparison.
    Compare {
        /// Column position.
        column: usize,
        /// Comparison.
        test: BoundTest,
        /// Whether the result is inverted.
        negated: bool,
    },
    /// A bound group.
    Group {
        /// How children are joined.
        connector: Connector,
        /// Bound children.
        children: Vec<BoundCondition>,
        /// Whether the result is inverted.
        negated: bool,
    },
}

/// The comparison part of a bound atom.
#[derive(Debug, Clone)]
pub enum BoundTest {
    /// Ordering comparison against a single value.
    Ordering(Operator, Value),
    /// Membership in a list.
    In(Vec<Value>),
    /// SQL `LIKE` match.
    Like(Regex),
}

impl BoundCondition {
    /// Binds a condition against a schema.
    ///
    /// # Errors
    ///
    /// Returns an error if a column is unknown or a literal cannot be coerced
    /// to its column's type.
    pub fn bind(
        condition: &Condition,
        schema: &RowSchema,
        resolver: &dyn ValueResolver,
    ) -> Result<Self> {
        match condition {
            Condition::Atom(atom) => {
                let column = schema.index_of(&atom.column).ok_or_else(|| {
                    Error::Query(QueryError::new(
                        QueryErrorKind::Semantic,
                        format!("unknown column '{}'", atom.column),
                    ))
                })?;
                let test = match (&atom.operator, &atom.operand) {
                    (Operator::In, Operand::List(items)) => {
                        BoundTest::In(resolver.resolve_list(&atom.column, items)?)
                    }
                    (Operator::In, Operand::Literal(value)) => {
                        BoundTest::In(vec![resolver.resolve(&atom.column, value)?])
                    }
                    (Operator::Like, operand) => {
                        let pattern = match operand {
                            Operand::Literal(value) => value.to_string(),
                            Operand::List(items) => items.clone(),
                        };
                        let regex = Regex::new(&like_to_regex(&pattern)).map_err(|e| {
                            Error::Query(QueryError::new(
                                QueryErrorKind::Semantic,
                                format!("invalid LIKE pattern '{pattern}': {e}"),
                            ))
                        })?;
                        BoundTest::Like(regex)
                    }
                    (op, Operand::Literal(value)) => {
                        BoundTest::Ordering(*op, resolver.resolve(&atom.column, value)?)
                    }
                    (op, Operand::List(_)) => {
                        return Err(Error::Query(QueryError::new(
                            QueryErrorKind::Semantic,
                            format!("operator {op} does not accept a list"),
                        )));
                    }
                };
                Ok(Self::Compare {
                    column,
                    test,
                    negated: atom.negated,
                })
            }
            Condition::Compound(compound) => Ok(Self::Group {
                connector: compound.connector,
                children: compound
                    .children
                    .iter()
                    .map(|child| Self::bind(child, schema, resolver))
                    .collect::<Result<_>>()?,
                negated: compound.negated,
            }),
        }
    }

    /// Evaluates the condition for a row.
    ///
    /// Comparisons involving nulls or incomparable types are false before
    /// negation is applied.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Self::Compare {
                column,
                test,
                negated,
            } => {
                let value = row.get(*column).unwrap_or(&Value::Null);
                test.evaluate(value) != *negated
            }
            Self::Group {
                connector,
                children,
                negated,
            } => {
                let result = match connector {
                    Connector::And => children.iter().all(|c| c.matches(row)),
                    Connector::Or => children.iter().any(|c| c.matches(row)),
                };
                result != *negated
            }
        }
    }
}

impl BoundTest {
    fn evaluate(&self, value: &Value) -> bool {
        if value.is_null() {
            return false;
        }
        match self {
            Self::Ordering(op, literal) => match value.compare(literal) {
                Some(ordering) => match op {
                    Operator::Eq => ordering == Ordering::Equal,
                    Operator::Neq => ordering != Ordering::Equal,
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::Lte => ordering != Ordering::Greater,
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::Gte => ordering != Ordering::Less,
                    Operator::In | Operator::Like => false,
                },
                None => false,
            },
            Self::In(items) => items
                .iter()
                .any(|item| value.compare(item) == Some(Ordering::Equal)),
            Self::Like(regex) => regex.is_match(&value.to_string()),
        }
    }
}

/// Converts a SQL `LIKE` pattern into an anchored regular expression.
///
/// `%` matches any run of characters and `_` a single character; everything
/// else matches literally.
#[must_use]
pub fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push_str("^(?s)");
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '%' | '_' => {
                regex.push_str(&regex::escape(&literal));
                literal.clear();
                regex.push_str(if c == '%' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    regex.push_str(&regex::escape(&literal));
    regex.push('$');
    regex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::SchemaResolver;
    use tapline_common::types::{ColumnMeta, LogicalType};

    fn schema() -> RowSchema {
        RowSchema::new(vec![
            ColumnMeta::new("name", LogicalType::String),
            ColumnMeta::new("age", LogicalType::Int64),
        ])
    }

    fn bind(condition: &Condition) -> BoundCondition {
        let schema = schema();
        BoundCondition::bind(condition, &schema, &SchemaResolver::new(schema.clone())).unwrap()
    }

    fn row(name: &str, age: i64) -> Row {
        Row::new(vec![Value::from(name), Value::Int64(age)])
    }

    #[test]
    fn test_compare_with_coercion() {
        let bound = bind(&Condition::compare("age", Operator::Gte, "30"));
        assert!(bound.matches(&row("a", 30)));
        assert!(!bound.matches(&row("a", 29)));
    }

    #[test]
    fn test_in_and_negation() {
        let bound = bind(&Condition::in_list("name", ["ann", "bob"]).negate());
        assert!(!bound.matches(&row("ann", 1)));
        assert!(bound.matches(&row("cid", 1)));
    }

    #[test]
    fn test_like() {
        let bound = bind(&Condition::compare("name", Operator::Like, "a_n%"));
        assert!(bound.matches(&row("anne", 1)));
        assert!(bound.matches(&row("ann", 1)));
        assert!(!bound.matches(&row("bann", 1)));
    }

    #[test]
    fn test_negated_group() {
        let condition = Condition::or(vec![
            Condition::compare("name", Operator::Eq, "ann"),
            Condition::compare("age", Operator::Eq, 2i64),
        ])
        .negate();
        let bound = bind(&condition);
        assert!(!bound.matches(&row("ann", 1)));
        assert!(!bound.matches(&row("bob", 2)));
        assert!(bound.matches(&row("bob", 3)));
    }

    #[test]
    fn test_null_never_matches() {
        let bound = bind(&Condition::compare("name", Operator::Neq, "x"));
        assert!(!bound.matches(&Row::new(vec![Value::Null, Value::Int64(1)])));
    }

    #[test]
    fn test_bad_literal_fails_binding() {
        let schema = schema();
        let err = BoundCondition::bind(
            &Condition::compare("age", Operator::Eq, "old"),
            &schema,
            &SchemaResolver::new(schema.clone()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::RowConversion { .. }));
    }

    #[test]
    fn test_like_escapes_regex_chars() {
        assert_eq!(like_to_regex("a.b%"), "^(?s)a\\.b.*$");
    }
}
