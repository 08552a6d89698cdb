//! Error types for the core store.

use reldb_value::Value;
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// The constraint a field value violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Another row already holds the value.
    Unique,
    /// A required field is missing or null.
    Required,
    /// The value does not match the field's pattern.
    Regexp,
    /// The value exceeds the field's maximum.
    Maximum,
    /// The value falls below the field's minimum.
    Minimum,
    /// The value has the wrong type for the field.
    Type,
    /// The value is outside the field's allowed set.
    Range,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unique => "unique",
            Self::Required => "required",
            Self::Regexp => "regexp",
            Self::Maximum => "maximum",
            Self::Minimum => "minimum",
            Self::Type => "type",
            Self::Range => "range",
        };
        write!(f, "{text}")
    }
}

/// Errors that can occur in core store operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Value conversion error.
    #[error("value error: {0}")]
    Value(#[from] reldb_value::ValueError),

    /// Condition parse or evaluation error.
    #[error("condition error: {0}")]
    Condition(#[from] reldb_query::QueryError),

    /// A field value violated one of its constraints.
    #[error("invalid field {table}.{field} ({kind}): {value}")]
    FieldInvalid {
        /// The violated constraint.
        kind: ConstraintKind,
        /// Table the row belongs to.
        table: String,
        /// The offending field.
        field: String,
        /// Redacted rendering of the offending value.
        value: String,
    },

    /// A row or schema does not have the named field.
    #[error("field not found: {table}.{field}")]
    FieldNotFound {
        /// Table the lookup ran against.
        table: String,
        /// The missing field.
        field: String,
    },

    /// A delete would break a foreign-key reference.
    #[error("delete constraint: referenced by {detail}")]
    DeleteConstraint {
        /// `source_table.#id.field -> #value` coordinates of the
        /// referencing row.
        detail: String,
    },

    /// The table is not registered and may not be auto-created.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// The table name.
        table: String,
    },

    /// The transaction was aborted.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for the abort.
        reason: String,
    },

    /// A transaction was entered while another was executing.
    #[error("nested transaction entry is forbidden")]
    NestedTransaction,

    /// Waiting for a pooled connection timed out.
    #[error("connection pool wait timed out")]
    PoolTimeout,

    /// A reference fetch hook failed.
    #[error("fetch failed: {message}")]
    FetchFailed {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a field constraint violation.
    pub fn field_invalid(
        kind: ConstraintKind,
        table: impl Into<String>,
        field: impl Into<String>,
        value: &Value,
    ) -> Self {
        Self::FieldInvalid {
            kind,
            table: table.into(),
            field: field.into(),
            value: redact(value),
        }
    }

    /// Creates a field not found error.
    pub fn field_not_found(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self::FieldNotFound {
            table: table.into(),
            field: field.into(),
        }
    }

    /// Creates a delete constraint error from the referencing coordinates.
    pub fn delete_constraint(
        source_table: &str,
        source_id: &reldb_value::Id,
        field: &str,
        value: &reldb_value::Id,
    ) -> Self {
        Self::DeleteConstraint {
            detail: format!("{source_table}.#{source_id}.{field} -> #{value}"),
        }
    }

    /// Creates an unknown table error.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable {
            table: table.into(),
        }
    }

    /// Creates a transaction aborted error.
    pub fn transaction_aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Creates a fetch failed error.
    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self::FetchFailed {
            message: message.into(),
        }
    }

    /// The violated constraint, if this is a field error.
    #[must_use]
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            Self::FieldInvalid { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Renders a value for an error message without leaking large payloads.
fn redact(value: &Value) -> String {
    match value {
        Value::Text(s) if s.chars().count() > 32 => {
            format!("{}...", s.chars().take(32).collect::<String>())
        }
        Value::Bytes(b) => format!("<{} bytes>", b.len()),
        other => {
            let text = format!("{other:?}");
            if text.len() > 48 {
                format!("<{}>", other.type_name())
            } else {
                text
            }
        }
    }
}
