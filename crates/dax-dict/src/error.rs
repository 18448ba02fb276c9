//! Error types for persisted dictionaries.

use thiserror::Error;

/// Errors that can occur during dictionary operations.
#[derive(Debug, Error)]
pub enum DictError {
    /// No record is stored under the key.
    #[error("key not found in {table}: {key}")]
    KeyNotFound { table: String, key: String },

    /// A value does not have the type its field declares.
    #[error("field {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// A storage constraint other than key uniqueness was violated.
    #[error("invalid value for {table}: {reason}")]
    InvalidValue { table: String, reason: String },

    /// Malformed construction input: bad names, schemas or configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure reported by SQLite.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Convenience type alias for dictionary operations.
pub type DictResult<T> = std::result::Result<T, DictError>;
