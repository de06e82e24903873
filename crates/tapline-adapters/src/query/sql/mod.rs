//! SQL front end.
//!
//! Only the subset needed to address a service is recognized:
//!
//! ```text
//! SELECT <* | column, ...> FROM <service>
//!     [WHERE <predicate>]
//!     [LIMIT <n>] [;]
//! ```
//!
//! Predicates combine comparisons (`=`, `<>`, `!=`, `<`, `<=`, `>`, `>=`),
//! `[NOT] IN (...)` and `[NOT] LIKE '...'` with `AND`, `OR`, `NOT` and
//! parentheses. Identifiers may be double-quoted.

mod ast;
mod lexer;
mod parser;

pub use ast::SqlQuery;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;

use tapline_common::utils::error::Result;

/// Parses a SQL query.
///
/// # Errors
///
/// Returns [`Error::Query`](tapline_common::Error::Query) with a syntax
/// error locating the offending token.
pub fn parse(query: &str) -> Result<SqlQuery> {
    Parser::new(query).parse()
}
