//! Error types for parsing, lowering and executing rules.
//!
//! - [`ParseError`] - malformed statements, localized to their source line
//! - [`DocumentError`] - malformed canonical documents
//! - [`UnparseError`] - actions with no surface syntax
//! - [`ExecutionError`] - failures while running a rule on the table stack
//! - [`FetchError`] - failures reported by a registry client
//!
//! [`Error`] wraps all of them so `?` works across layers.

use thiserror::Error;

use crate::parser::Rule as GrammarRule;

/// Errors while parsing rule statements.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A statement did not match the grammar.
    #[error("line {line}: failed to parse `{statement}`: {source}")]
    Syntax {
        line: usize,
        statement: String,
        #[source]
        source: Box<pest::error::Error<GrammarRule>>,
    },
}

impl ParseError {
    /// Line number (1-based) of the offending statement.
    pub fn line(&self) -> usize {
        match self {
            ParseError::Syntax { line, .. } => *line,
        }
    }
}

/// Errors while reading a canonical document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("action `{action}` is missing field `{field}`")]
    MissingField { action: String, field: String },

    #[error("field `{field}` should be {expected}")]
    WrongKind {
        field: String,
        expected: &'static str,
    },

    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors while rendering actions back into surface syntax.
#[derive(Debug, Error)]
pub enum UnparseError {
    #[error("no surface syntax for action `{0}`")]
    UnrecognizedAction(String),
}

/// Failure reported by a registry client. Not interpreted any further.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct FetchError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Errors while executing a rule.
///
/// Execution stops at the first error. Commits emitted before the failing
/// action are not rolled back.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("stack underflow in `{action}`: needs {needed} frame(s), {available} available")]
    StackUnderflow {
        action: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("missing column: {column}")]
    MissingColumn { column: String },

    #[error("`{action}` pairs {left} left key(s) with {right} right key(s)")]
    MismatchedKeys {
        action: &'static str,
        left: usize,
        right: usize,
    },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("value {value:?} in column `{column}` is not a number")]
    NotANumber { column: String, value: String },

    #[error("no repository attached for namespace `{0}`")]
    UnknownRepository(String),

    #[error("namespace `{0}` matches no repository name and several repositories are attached")]
    AmbiguousRepository(String),

    #[error("failed to fetch from repository {url}: {source}")]
    RepositoryFetch {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// Top-level error for callers going from text to committed tables.
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    #[error("unparse error: {0}")]
    Unparse(#[from] UnparseError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
}

pub type ParseResult<T> = Result<T, ParseError>;

pub type DocumentResult<T> = Result<T, DocumentError>;

pub type ExecutionResult<T> = Result<T, ExecutionError>;

pub type FetchResult<T> = Result<T, FetchError>;
