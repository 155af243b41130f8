//! Type conversion error types.

use thiserror::Error;

/// Errors that can occur while decoding row fields or converting values.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum TypeError {
    /// Value is null when non-null was expected.
    #[error("unexpected null value")]
    UnexpectedNull,

    /// Type mismatch during conversion.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: String,
    },

    /// Value is out of range for target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// A field's bytes do not match its declared column type.
    #[error("malformed {column_type} field: {reason}")]
    Malformed {
        /// Declared column type.
        column_type: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// Invalid UTF-8 in string data.
    #[error("invalid string encoding: {0}")]
    InvalidEncoding(String),

    /// Invalid date/time value.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),

    /// Invalid decimal value.
    #[error("invalid decimal: {0}")]
    InvalidDecimal(String),

    /// Invalid JSON document.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// No column or field with this name.
    #[error("no column named {0}")]
    UnknownColumn(String),

    /// Column index past the end of the row.
    #[error("column index {index} out of range for {len} columns")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of columns.
        len: usize,
    },
}

impl TypeError {
    pub(crate) fn malformed(column_type: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            column_type,
            reason: reason.into(),
        }
    }
}
