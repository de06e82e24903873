//! Error types shared across Tapline.
//!
//! Every layer reports failures through [`Error`]. Narrower error enums
//! ([`QueryError`], [`PredicateError`]) carry the details for the two
//! failure families callers most often need to inspect.

use crate::types::LogicalType;
use std::fmt;
use thiserror::Error;

/// Result type alias using the Tapline [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// No service is registered under the requested name.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// The designated step does not exist in a built pipeline.
    #[error("step '{step}' is not accessible in pipeline '{pipeline}'")]
    StepNotAccessible {
        /// Pipeline name.
        pipeline: String,
        /// Missing step name.
        step: String,
    },

    /// A predicate cannot be expressed in the target query language.
    #[error("unsupported predicate: {0}")]
    UnsupportedPredicate(#[from] PredicateError),

    /// A literal or input value cannot be coerced to a column type.
    #[error("cannot convert '{value}' to {target}: {reason}")]
    RowConversion {
        /// The offending value, rendered as text.
        value: String,
        /// The requested column type.
        target: LogicalType,
        /// Why the conversion failed.
        reason: String,
    },

    /// Query text could not be parsed or bound.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Pipeline build or execution failure.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// A push-down optimization failed.
    #[error("optimization '{name}' failed: {message}")]
    Optimization {
        /// Optimization name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// Cache backend failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invariant violation inside Tapline.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a row conversion error.
    pub fn row_conversion(
        value: impl fmt::Display,
        target: LogicalType,
        reason: impl Into<String>,
    ) -> Self {
        Self::RowConversion {
            value: value.to_string(),
            target,
            reason: reason.into(),
        }
    }

    /// Returns whether this error was raised before any row could stream.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotFound(_)
                | Self::StepNotAccessible { .. }
                | Self::Query(_)
                | Self::Config(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Reasons a condition tree cannot be translated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredicateError {
    /// The target language has no mapping for the operator.
    #[error("operator {operator} is not supported by {target}")]
    UnsupportedOperator {
        /// Operator symbol.
        operator: String,
        /// Target language name.
        target: String,
    },

    /// Negation over a compound node.
    #[error("negated compound conditions cannot be translated")]
    UnsupportedNegation,

    /// A compound node with fewer than two children after unwrapping.
    #[error("compound condition has {0} children, at least 2 are required")]
    InsufficientChildren(usize),

    /// The condition references a column the target does not know.
    #[error("column '{0}' cannot be mapped to the target")]
    UnmappedColumn(String),
}

/// Source location within a query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    /// Start byte offset.
    pub start: usize,
    /// End byte offset.
    pub end: usize,
    /// Line number (1-based).
    pub line: usize,
    /// Column number (1-based).
    pub column: usize,
}

impl SourceSpan {
    /// Creates a new span.
    #[must_use]
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// Category of a query error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Malformed query text.
    Syntax,
    /// Well-formed query referencing something that does not exist.
    Semantic,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => f.write_str("syntax error"),
            Self::Semantic => f.write_str("semantic error"),
        }
    }
}

/// An error raised while parsing or binding query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    /// Error category.
    pub kind: QueryErrorKind,
    /// Human readable message.
    pub message: String,
    /// Location of the offending token.
    pub span: Option<SourceSpan>,
    /// The full query text.
    pub source: Option<String>,
}

impl QueryError {
    /// Creates a new query error.
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            source: None,
        }
    }

    /// Attaches a source span.
    #[must_use]
    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Attaches the query text.
    #[must_use]
    pub fn with_source(mut self, source: String) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(span) = self.span {
            write!(f, " at line {}, column {}", span.line, span.column)?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryError {}
