//! SQL Abstract Syntax Tree.

use tapline_common::utils::error::SourceSpan;
use tapline_core::condition::Condition;

/// A parsed `SELECT` against a single service.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    /// The service (virtual table) name.
    pub service_name: String,
    /// Projected columns; empty means `*`.
    pub projected_columns: Vec<String>,
    /// The `WHERE` clause, if any.
    pub condition: Option<Condition>,
    /// The `LIMIT` clause, if any.
    pub limit: Option<u64>,
    /// Source span of the statement.
    pub span: Option<SourceSpan>,
}

impl SqlQuery {
    /// Returns whether every column is selected.
    #[must_use]
    pub fn selects_all(&self) -> bool {
        self.projected_columns.is_empty()
    }
}
