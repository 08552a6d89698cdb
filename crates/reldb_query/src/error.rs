//! Error types for the query crate.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while parsing or evaluating a condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The condition text could not be parsed.
    #[error("parse error at offset {position}: {message}")]
    Parse {
        /// Description of the problem.
        message: String,
        /// Byte offset into the condition text.
        position: usize,
    },

    /// A path names a field the row does not have.
    #[error("unknown field: {field}")]
    UnknownField {
        /// The dotted field path as written.
        field: String,
    },

    /// Operand and field values cannot be compared.
    #[error("type mismatch: {message}")]
    TypeMismatch {
        /// Description of the mismatch.
        message: String,
    },
}

impl QueryError {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>, position: usize) -> Self {
        Self::Parse {
            message: message.into(),
            position,
        }
    }

    /// Create an unknown field error.
    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
        }
    }
}
