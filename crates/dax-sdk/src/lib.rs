//! High-level SDK for dax.
//!
//! [`Repository`] is the main entry point: it composes configuration,
//! opens the relational store that backs persisted dictionaries, and builds
//! the configured datastore.

pub mod component;
pub mod error;
pub mod repository;

pub use component::{RegistryComponent, REGISTRY_COMPONENT};
pub use error::{SdkError, SdkResult};
pub use repository::{Repository, RepositoryOptions};

// Re-export key types
pub use dax_config::{ConfigSource, ConfigTree, ResolvedConfig};
pub use dax_dict::{PersistedDict, PersistedRecord};
pub use dax_store::{DatasetUri, StorageBackend};
pub use dax_types::{Dataset, DatasetId, DatasetRef, DatasetType, Parameters, StorageClass, ValueKind};
