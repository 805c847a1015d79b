//! Error types for the statement engine
//!
//! One checked family for everything the engine can raise. Parse errors
//! from the condition mini-language carry an optional source line;
//! privilege failures get a dedicated variant so callers can surface
//! "permission denied" without string matching.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Mini-language parse errors
    #[error("parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        message: String,
        line: Option<usize>,
    },

    // Command envelope errors
    #[error("malformed command: {0}")]
    Command(String),

    // Statement lifecycle
    #[error("statement is {0}; evaluate requires a successful prepare first")]
    StatementState(&'static str),

    // Catalog errors
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    DuplicateTable(String),

    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    #[error("schema already exists: {0}")]
    DuplicateSchema(String),

    #[error("schema is not empty: {0}")]
    SchemaNotEmpty(String),

    // Name resolution
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("ambiguous column reference '{name}' matches {}", matches.join(", "))]
    AmbiguousColumn { name: String, matches: Vec<String> },

    #[error("ambiguous table reference '{name}' matches {}", matches.join(", "))]
    AmbiguousTable { name: String, matches: Vec<String> },

    #[error("ambiguous schema reference '{name}' matches {}", matches.join(", "))]
    AmbiguousSchema { name: String, matches: Vec<String> },

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("trigger not found: {0}")]
    TriggerNotFound(String),

    #[error("trigger already exists: {0}")]
    DuplicateTrigger(String),

    // Type errors
    #[error("unknown SQL type: {0}")]
    UnknownType(String),

    #[error("invalid type declaration for {name}: {reason}")]
    InvalidType { name: String, reason: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    // Statement semantics
    #[error("arity mismatch: {0}")]
    ArityMismatch(String),

    #[error("sub-select is not permitted in {0}")]
    IllegalSubquery(&'static str),

    // Constraint violations
    #[error("NULL constraint violation on column: {0}")]
    NullConstraintViolation(String),

    #[error("primary key violation: {0}")]
    PrimaryKeyViolation(String),

    #[error("unique constraint violation: {0}")]
    UniqueConstraintViolation(String),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("check constraint violation: {0}")]
    CheckConstraintViolation(String),

    // Privilege errors, kept distinct from the semantic family
    #[error("access denied: user may not {action} {object}")]
    AccessDenied { action: String, object: String },
}

impl Error {
    /// Parse error with a known source line.
    pub fn parse_at(message: impl Into<String>, line: usize) -> Self {
        Error::Parse {
            message: message.into(),
            line: Some(line),
        }
    }

    /// Parse error without line information.
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
            line: None,
        }
    }

    /// True if this is a privilege failure.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Error::AccessDenied { .. })
    }
}
