use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// A value does not have the kind its storage class declares.
    #[error("storage class {storage_class} expects {expected}, got {actual}")]
    KindMismatch {
        storage_class: String,
        expected: String,
        actual: String,
    },

    /// A read parameter is not accepted by the storage class.
    #[error("parameter {name:?} is not supported by storage class {storage_class}")]
    UnsupportedParameter { storage_class: String, name: String },

    /// A read parameter is accepted but cannot be applied to the value.
    #[error("invalid parameter {name:?}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("invalid dataset type name: {0:?}")]
    InvalidName(String),
}
