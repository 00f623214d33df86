//! Error types for SQL parsing and AST transformation.
//!
//! # Error Handling Strategy
//!
//! - [`ParseError`]: the input text did not parse. Returned as `Result<T, ParseError>`
//!   and stops processing of the affected statement.
//!
//! - [`TransformError`]: every precondition a rewriter can fail on (unknown column,
//!   unsupported operator, a JSON mapping that doesn't validate, a cycle in a CTE
//!   graph, ...). Rewriters propagate these unchanged to the façade, wrapping only
//!   to attach the offending node's identity (see each variant's doc comment).
//!
//! The alias renamer is the one exception: it never returns `Err`, it reports
//! failure inside its `RenameResult` (see `crate::alias_rename`).

use crate::types::Dialect;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
#[cfg(feature = "tracing")]
use tracing::trace;

/// Error encountered during SQL parsing.
///
/// This error preserves structured information from the underlying parser
/// including position information when available.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Human-readable error message.
    pub message: String,
    /// Byte offset where the error occurred, if available.
    pub position: Option<Position>,
    /// The SQL dialect being parsed when the error occurred.
    pub dialect: Option<Dialect>,
    /// The specific category of parse error.
    pub kind: ParseErrorKind,
}

/// Position information for a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed).
    pub column: usize,
}

/// Category of parse error for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseErrorKind {
    /// Unexpected token or character in input.
    #[default]
    SyntaxError,
    /// Missing required clause or keyword.
    MissingClause,
    /// Invalid or unexpected end of input.
    UnexpectedEof,
    /// Feature not supported by the current dialect.
    UnsupportedFeature,
    /// Lexer/tokenization error.
    LexerError,
}

impl ParseError {
    /// Creates a new parse error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
            dialect: None,
            kind: ParseErrorKind::SyntaxError,
        }
    }

    /// Creates a parse error with position information.
    pub fn with_position(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            position: Some(Position { line, column }),
            dialect: None,
            kind: ParseErrorKind::SyntaxError,
        }
    }

    /// Adds dialect context to the error.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Sets the error kind.
    pub fn with_kind(mut self, kind: ParseErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Parses position from sqlparser error message format.
    ///
    /// sqlparser uses format like "Expected ..., found ... at Line: X, Column: Y"
    ///
    /// # Implementation Note
    ///
    /// This parsing is coupled to the `sqlparser` crate's error message format.
    /// Uses regex for robust parsing that handles various whitespace and formatting
    /// variations. Gracefully returns `None` when the expected format is not found.
    fn parse_position_from_message(message: &str) -> Option<Position> {
        // Use a static regex for performance - compiled once on first use
        static POSITION_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = POSITION_REGEX.get_or_init(|| {
            // Match "Line: <number>" followed by optional comma/whitespace, then "Column: <number>"
            // Handles variations like "Line: 1, Column: 5" or "Line:1,Column:5"
            Regex::new(r"Line:\s*(\d+)\s*,\s*Column:\s*(\d+)").expect("Invalid regex pattern")
        });

        let result = re.captures(message).and_then(|caps| {
            let line: usize = caps.get(1)?.as_str().parse().ok()?;
            let column: usize = caps.get(2)?.as_str().parse().ok()?;
            Some(Position { line, column })
        });

        #[cfg(feature = "tracing")]
        if result.is_none() && (message.contains("Line") || message.contains("Column")) {
            trace!(
                "Failed to parse position from error message that appears to contain position info: {}",
                message
            );
        }

        result
    }

    /// Determines the error kind from the message content.
    ///
    /// # Implementation Note
    ///
    /// Like [`Self::parse_position_from_message`], this function relies on patterns
    /// in `sqlparser` error messages and may need updates if those messages change.
    fn infer_kind_from_message(message: &str) -> ParseErrorKind {
        let lower = message.to_lowercase();
        if lower.contains("unexpected end") || lower.contains("eof") {
            ParseErrorKind::UnexpectedEof
        } else if lower.contains("expected") {
            ParseErrorKind::MissingClause
        } else if lower.contains("not supported") || lower.contains("unsupported") {
            ParseErrorKind::UnsupportedFeature
        } else if lower.contains("lexer") || lower.contains("token") {
            ParseErrorKind::LexerError
        } else {
            ParseErrorKind::SyntaxError
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error")?;

        if let Some(dialect) = self.dialect {
            write!(f, " ({dialect:?})")?;
        }

        if let Some(pos) = self.position {
            write!(f, " at line {}, column {}", pos.line, pos.column)?;
        }

        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        let message = err.to_string();
        let position = Self::parse_position_from_message(&message);
        let kind = Self::infer_kind_from_message(&message);

        Self {
            message,
            position,
            dialect: None,
            kind,
        }
    }
}

/// Every way a rewriter can refuse to transform a query.
///
/// Variants map directly onto the error taxonomy in the design: each
/// carries the context (column, parameter, entity id, or source position)
/// needed to locate the problem without re-parsing the query.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("unsupported operator '{op}' for parameter '{name}'")]
    UnsupportedOperator { op: String, name: String },

    #[error("all parameters in the filter state are undefined")]
    AllParametersUndefined,

    #[error("query already has LIMIT and/or OFFSET; refusing to paginate")]
    PaginationConflict,

    #[error("JSON mapping invalid: {0}")]
    MappingValidationError(String),

    #[error("non-JSONB output was requested but the target dialect cannot GROUP BY plain JSON")]
    JsonbRequired,

    #[error("CTE graph has not been analyzed yet")]
    NotAnalyzed,

    #[error("circular CTE reference through '{0}'")]
    CircularReference(String),

    #[error("join/aggregation decomposition failed: {reason}")]
    DecompositionError {
        reason: String,
        source_sql: String,
    },

    #[error("position does not point at an identifier")]
    NotAnAlias,

    #[error("name '{0}' conflicts with an existing alias or table in scope")]
    NameConflict(String),

    #[error("position is outside the SQL text or not on a line boundary")]
    InvalidPosition,

    #[error("missing binding for parameter '{0}'")]
    MissingParameter(String),

    #[error("fixture table '{0}' was not supplied")]
    MissingFixture(String),

    #[error("columns could not be inferred from the select list")]
    ColumnsNotInferrable,

    #[error("primary key column '{0}' is not present in the select list")]
    MissingPrimaryKey(String),

    #[error("no updatable columns remain once primary keys are excluded")]
    NoUpdatableColumns,

    #[error("a referenced column could not be resolved: {0}")]
    ColumnUnresolved(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}
