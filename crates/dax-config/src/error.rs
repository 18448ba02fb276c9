//! Error types for configuration loading and resolution.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading a configuration file failed.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file could not be parsed.
    #[error("failed to parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// The file extension does not name a supported format.
    #[error("unsupported config file type: {0}")]
    UnsupportedFormat(PathBuf),

    /// A key that must hold a nested mapping holds something else.
    #[error("config key {key:?} is not a mapping")]
    NotAMapping { key: String },

    /// Mandatory keys are absent from a resolved component.
    #[error("mandatory keys {keys:?} missing from configuration for component {component:?}")]
    MissingKeys {
        component: String,
        keys: Vec<String>,
    },

    /// A component rejected its resolved configuration.
    #[error("invalid configuration for component {component:?}: {reason}")]
    Invalid { component: String, reason: String },
}

/// Convenience type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
