//! Error types for the value crate.

use thiserror::Error;

/// Result type for value operations.
pub type ValueResult<T> = Result<T, ValueError>;

/// Errors that can occur while working with row values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A value did not have the expected type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The type that was expected.
        expected: String,
        /// The type that was found.
        actual: String,
    },

    /// A JSON document could not be converted to a value.
    #[error("invalid JSON value: {message}")]
    InvalidJson {
        /// Description of the problem.
        message: String,
    },
}

impl ValueError {
    /// Create a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
        }
    }
}
