//! Condition trees.
//!
//! A [`Condition`] is the parsed form of a SQL `WHERE` clause. Leaves are
//! [`Atom`]s comparing a column with a literal; inner nodes are
//! [`Compound`]s joining children with AND or OR.
//!
//! The connector of a compound node is stored on the node itself. Trees built
//! in the legacy shape, where only the second child remembers how it was
//! joined to its left sibling, can be normalized with
//! [`Compound::from_legacy`].
//!
//! ## Submodules
//!
//! - [`resolver`] - Coercion of literal values to column types
//! - [`eval`] - Evaluation of a condition against rows

pub mod eval;
pub mod resolver;

pub use eval::BoundCondition;
pub use resolver::{SchemaResolver, ValueResolver};

use serde::{Deserialize, Serialize};
use std::fmt;
use tapline_common::types::Value;

/// A comparison operator on an atomic condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// `=`
    Eq,
    /// `<>`
    Neq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `IN (...)`
    In,
    /// `LIKE`
    Like,
}

impl Operator {
    /// Returns the SQL spelling of the operator.
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "IN",
            Self::Like => "LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// How the children of a compound condition are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connector {
    /// All children must hold.
    And,
    /// At least one child must hold.
    Or,
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
        }
    }
}

/// Right-hand side of an atomic condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// A single literal.
    Literal(Value),
    /// A `;`-delimited list, as produced for `IN` predicates.
    ///
    /// Literal semicolons are escaped as `\;` and backslashes as `\\`.
    List(String),
}

impl Operand {
    /// Builds a list operand from individual items, escaping delimiters.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::List(resolver::join_delimited(items))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(Value::String(s)) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Literal(v) => write!(f, "{v}"),
            Self::List(items) => {
                let parts: Vec<String> = resolver::split_delimited(items)
                    .into_iter()
                    .map(|s| format!("'{}'", s.replace('\'', "''")))
                    .collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// A leaf comparison: `column <op> operand`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// Column name (left operand).
    pub column: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Literal value or list (right operand).
    pub operand: Operand,
    /// Whether the comparison is negated.
    #[serde(default)]
    pub negated: bool,
}

/// An inner node joining two or more children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compound {
    /// How the children are joined.
    pub connector: Connector,
    /// Ordered children.
    pub children: Vec<Condition>,
    /// Whether the whole group is negated.
    #[serde(default)]
    pub negated: bool,
}

impl Compound {
    /// Builds a compound node from children in the legacy layout.
    ///
    /// In that layout each child after the first carries the connector that
    /// joined it to its left sibling, and the node's own connector is the one
    /// stored on its second child. Returns `None` when there is no second
    /// child to read it from.
    #[must_use]
    pub fn from_legacy(children: Vec<(Option<Connector>, Condition)>, negated: bool) -> Option<Self> {
        let connector = children.get(1).and_then(|(connector, _)| *connector)?;
        Some(Self {
            connector,
            children: children.into_iter().map(|(_, child)| child).collect(),
            negated,
        })
    }
}

/// A boolean predicate over the columns of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// A single comparison.
    Atom(Atom),
    /// A group of conditions.
    Compound(Compound),
}

impl Condition {
    /// Creates an atomic condition.
    pub fn atom(column: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        Self::Atom(Atom {
            column: column.into(),
            operator,
            operand,
            negated: false,
        })
    }

    /// Creates an atomic comparison against a single literal.
    pub fn compare(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::atom(column, operator, Operand::Literal(value.into()))
    }

    /// Creates an `IN` condition from list items.
    pub fn in_list<I, S>(column: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::atom(column, Operator::In, Operand::list(items))
    }

    /// Creates a conjunction.
    #[must_use]
    pub fn and(children: Vec<Condition>) -> Self {
        Self::Compound(Compound {
            connector: Connector::And,
            children,
            negated: false,
        })
    }

    /// Creates a disjunction.
    #[must_use]
    pub fn or(children: Vec<Condition>) -> Self {
        Self::Compound(Compound {
            connector: Connector::Or,
            children,
            negated: false,
        })
    }

    /// Returns the logical negation of this condition.
    ///
    /// Only the negated flag of the root node flips; the children are left
    /// untouched.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Atom(mut atom) => {
                atom.negated = !atom.negated;
                Self::Atom(atom)
            }
            Self::Compound(mut compound) => {
                compound.negated = !compound.negated;
                Self::Compound(compound)
            }
        }
    }

    /// Returns whether the root node is negated.
    #[must_use]
    pub fn is_negated(&self) -> bool {
        match self {
            Self::Atom(atom) => atom.negated,
            Self::Compound(compound) => compound.negated,
        }
    }

    /// Removes redundant single-child, non-negated compound wrappers.
    ///
    /// Applied recursively, so nested wrappers anywhere in the tree collapse.
    #[must_use]
    pub fn unwrap_redundant(self) -> Self {
        match self {
            Self::Compound(mut compound) => {
                if compound.children.len() == 1 && !compound.negated {
                    if let Some(only) = compound.children.pop() {
                        return only.unwrap_redundant();
                    }
                }
                compound.children = compound
                    .children
                    .into_iter()
                    .map(Condition::unwrap_redundant)
                    .collect();
                Self::Compound(compound)
            }
            atom => atom,
        }
    }

    /// Returns every column referenced by the tree, in first-seen order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut columns = Vec::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Atom(atom) => {
                if !out.contains(&atom.column.as_str()) {
                    out.push(&atom.column);
                }
            }
            Self::Compound(compound) => {
                for child in &compound.children {
                    child.collect_columns(out);
                }
            }
        }
    }

    /// Returns the atoms that must all hold for the condition to hold.
    ///
    /// Walks through non-negated AND groups only; anything under an OR or a
    /// negation is not a required conjunct.
    #[must_use]
    pub fn conjuncts(&self) -> Vec<&Atom> {
        let mut atoms = Vec::new();
        self.collect_conjuncts(&mut atoms);
        atoms
    }

    fn collect_conjuncts<'a>(&'a self, out: &mut Vec<&'a Atom>) {
        match self {
            Self::Atom(atom) => out.push(atom),
            Self::Compound(compound) => {
                if compound.negated {
                    return;
                }
                if compound.connector == Connector::And || compound.children.len() == 1 {
                    for child in &compound.children {
                        child.collect_conjuncts(out);
                    }
                }
            }
        }
    }

    /// Applies `f` to every string literal and list in the tree.
    pub fn map_strings(&mut self, f: &impl Fn(&str) -> String) {
        match self {
            Self::Atom(atom) => match &mut atom.operand {
                Operand::Literal(Value::String(s)) => {
                    let replaced = f(s.as_ref());
                    *s = replaced.into();
                }
                Operand::List(items) => *items = f(items),
                Operand::Literal(_) => {}
            },
            Self::Compound(compound) => {
                for child in &mut compound.children {
                    child.map_strings(f);
                }
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(atom) => {
                if atom.negated {
                    f.write_str("NOT ")?;
                }
                write!(f, "{} {} {}", atom.column, atom.operator, atom.operand)
            }
            Self::Compound(compound) => {
                if compound.negated {
                    f.write_str("NOT ")?;
                }
                f.write_str("(")?;
                for (i, child) in compound.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", compound.connector)?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}
