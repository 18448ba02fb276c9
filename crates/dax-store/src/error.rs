use dax_config::ConfigError;
use dax_dict::DictError;
use dax_location::LocationError;
use dax_types::TypeError;

/// Errors from storage backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The dataset is not stored in this backend.
    #[error("dataset not found: {0}")]
    NotFound(String),

    /// A file-like backend refuses to overwrite an existing artifact.
    #[error("already stored: {0}")]
    AlreadyExists(String),

    /// A value does not match the declared in-memory type, or stored bytes
    /// cannot be reconstituted into it.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Read parameters or values are inconsistent with the stored data.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Malformed call-time input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored artifact disagrees with its record (size or checksum).
    #[error("integrity failure for {dataset}: {reason}")]
    Integrity { dataset: String, reason: String },

    /// No backend implementation is registered under this `cls`.
    #[error("unknown backend class: {0}")]
    UnknownBackend(String),

    /// Encoding a value for storage failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The object-store client reported a failure.
    #[error("object store client error: {0}")]
    Client(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Dict(#[from] DictError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<TypeError> for StoreError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::KindMismatch { .. } | TypeError::InvalidName(_) => {
                Self::TypeMismatch(err.to_string())
            }
            TypeError::UnsupportedParameter { .. } | TypeError::InvalidParameter { .. } => {
                Self::InvalidValue(err.to_string())
            }
        }
    }
}

impl StoreError {
    /// Whether this is the "dataset absent" condition a chained backend
    /// skips over.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
