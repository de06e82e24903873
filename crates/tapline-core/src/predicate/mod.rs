//! Predicate translation.
//!
//! Converts a [`Condition`] tree into an expression of some target query
//! language so that filtering can happen inside the system that owns the
//! data. Each target is a [`TargetDialect`]: an [`OperatorTable`] mapping
//! every supported operator to an `affirm` transform and, where the target
//! has an idiomatic spelling for it, a `negate` transform. Operators without
//! a `negate` transform are negated through the dialect's generic NOT.
//!
//! ## Targets
//!
//! - [`document`] - Mongo-style JSON filter documents

pub mod document;

pub use document::DocumentDialect;

use crate::condition::resolver::ValueResolver;
use crate::condition::{Condition, Connector, Operand, Operator};
use hashbrown::HashMap;
use tapline_common::types::Value;
use tapline_common::utils::error::{PredicateError, Result};

/// A literal operand after coercion to the column type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedOperand {
    /// A single value.
    Value(Value),
    /// A list of values (for `IN`).
    List(Vec<Value>),
}

/// Builds a target expression from a target attribute name and an operand.
pub type Transform<E> = fn(&str, &ResolvedOperand) -> E;

/// The transforms registered for one operator.
pub struct OperatorEntry<E> {
    /// Expresses the operator as written.
    pub affirm: Transform<E>,
    /// Expresses the negated operator directly, if the target can.
    pub negate: Option<Transform<E>>,
}

impl<E> Clone for OperatorEntry<E> {
    fn clone(&self) -> Self {
        Self {
            affirm: self.affirm,
            negate: self.negate,
        }
    }
}

/// Operator dispatch table for a target dialect.
pub struct OperatorTable<E> {
    entries: HashMap<Operator, OperatorEntry<E>>,
}

impl<E> OperatorTable<E> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers an operator negated through the generic NOT.
    #[must_use]
    pub fn affirm(mut self, operator: Operator, affirm: Transform<E>) -> Self {
        self.entries.insert(
            operator,
            OperatorEntry {
                affirm,
                negate: None,
            },
        );
        self
    }

    /// Registers an operator with a dedicated negation.
    #[must_use]
    pub fn negatable(
        mut self,
        operator: Operator,
        affirm: Transform<E>,
        negate: Transform<E>,
    ) -> Self {
        self.entries.insert(
            operator,
            OperatorEntry {
                affirm,
                negate: Some(negate),
            },
        );
        self
    }

    /// Looks up the transforms for an operator.
    #[must_use]
    pub fn get(&self, operator: Operator) -> Option<&OperatorEntry<E>> {
        self.entries.get(&operator)
    }
}

impl<E> Default for OperatorTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A target query language.
pub trait TargetDialect: Send + Sync {
    /// The expression type produced for this target.
    type Expr: Clone;

    /// Returns the target name used in error messages.
    fn name(&self) -> &str;

    /// Returns the operator table.
    fn operators(&self) -> &OperatorTable<Self::Expr>;

    /// Maps a condition column to the target's attribute name.
    fn attribute(&self, column: &str) -> std::result::Result<String, PredicateError> {
        Ok(column.to_string())
    }

    /// Wraps an expression in the target's generic negation.
    fn not(&self, expr: Self::Expr) -> Self::Expr;

    /// Joins two or more expressions.
    fn combine(&self, connector: Connector, children: Vec<Self::Expr>) -> Self::Expr;
}

/// Translates condition trees into expressions of a target dialect.
pub struct PredicateTranslator<'a, D: TargetDialect> {
    dialect: &'a D,
    resolver: &'a dyn ValueResolver,
}

impl<'a, D: TargetDialect> PredicateTranslator<'a, D> {
    /// Creates a translator.
    pub fn new(dialect: &'a D, resolver: &'a dyn ValueResolver) -> Self {
        Self { dialect, resolver }
    }

    /// Translates a condition tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedPredicate`](tapline_common::Error::UnsupportedPredicate)
    /// for constructs the target cannot express, and a conversion error when
    /// a literal does not fit its column's type.
    pub fn translate(&self, condition: &Condition) -> Result<D::Expr> {
        let unwrapped = condition.clone().unwrap_redundant();
        self.translate_node(&unwrapped)
    }

    fn translate_node(&self, condition: &Condition) -> Result<D::Expr> {
        match condition {
            Condition::Atom(atom) => {
                let entry = self.dialect.operators().get(atom.operator).ok_or_else(|| {
                    PredicateError::UnsupportedOperator {
                        operator: atom.operator.symbol().to_string(),
                        target: self.dialect.name().to_string(),
                    }
                })?;
                let attribute = self.dialect.attribute(&atom.column)?;
                let operand = self.resolve_operand(&atom.column, atom.operator, &atom.operand)?;

                if atom.negated {
                    Ok(match entry.negate {
                        Some(negate) => negate(&attribute, &operand),
                        None => self.dialect.not((entry.affirm)(&attribute, &operand)),
                    })
                } else {
                    Ok((entry.affirm)(&attribute, &operand))
                }
            }
            Condition::Compound(compound) => {
                if compound.negated {
                    return Err(PredicateError::UnsupportedNegation.into());
                }
                if compound.children.len() < 2 {
                    return Err(PredicateError::InsufficientChildren(compound.children.len()).into());
                }
                let children = compound
                    .children
                    .iter()
                    .map(|child| self.translate_node(child))
                    .collect::<Result<Vec<_>>>()?;
                Ok(self.dialect.combine(compound.connector, children))
            }
        }
    }

    fn resolve_operand(
        &self,
        column: &str,
        operator: Operator,
        operand: &Operand,
    ) -> Result<ResolvedOperand> {
        match (operator, operand) {
            (Operator::In, Operand::List(items)) => {
                Ok(ResolvedOperand::List(self.resolver.resolve_list(column, items)?))
            }
            (Operator::In, Operand::Literal(value)) => Ok(ResolvedOperand::List(vec![
                self.resolver.resolve(column, value)?,
            ])),
            // LIKE patterns stay text whatever the column type.
            (Operator::Like, Operand::Literal(value)) => {
                Ok(ResolvedOperand::Value(Value::from(value.to_string())))
            }
            (Operator::Like, Operand::List(pattern)) => {
                Ok(ResolvedOperand::Value(Value::from(pattern.as_str())))
            }
            (_, Operand::Literal(value)) => {
                Ok(ResolvedOperand::Value(self.resolver.resolve(column, value)?))
            }
            (op, Operand::List(_)) => Err(PredicateError::UnsupportedOperator {
                operator: format!("{} with a list operand", op.symbol()),
                target: self.dialect.name().to_string(),
            }
            .into()),
        }
    }
}
