//! Error types for location resolution.

use thiserror::Error;

/// Errors that can occur while resolving locations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocationError {
    /// Malformed call-time input, such as an empty URI.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The string could not be parsed as a URI.
    #[error("invalid URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// The URI names a scheme other than the factory's backend scheme.
    #[error("URI {uri:?} does not use the {expected} scheme")]
    SchemeMismatch { uri: String, expected: String },

    /// The URI scheme is not handled by any location backend.
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
}

/// Convenience type alias for location operations.
pub type LocationResult<T> = std::result::Result<T, LocationError>;
