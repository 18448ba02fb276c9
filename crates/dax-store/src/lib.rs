//! Storage backends for dax.
//!
//! Every datastore implements [`StorageBackend`]. Single backends keep
//! datasets in memory ([`InMemoryBackend`]) or as one artifact per dataset
//! ([`FileLikeBackend`] over a filesystem or object-store [`BlobIo`]);
//! [`ChainedBackend`] composes several behind one interface, fanning writes
//! out and falling back across children on reads.
//!
//! # Modules
//!
//! - [`error`]: Error types for store operations
//! - [`traits`]: The [`StorageBackend`] trait and [`DatasetUri`]
//! - [`transaction`]: Undo logs and [`run_in_transaction`]
//! - [`memory`]: In-memory backend
//! - [`filelike`]: Artifact-per-dataset backend and the [`BlobIo`] seam
//! - [`posix`]: Local filesystem I/O
//! - [`object`]: Object-store I/O and the [`ObjectClient`] seam
//! - [`formatter`]: Dataset serialization
//! - [`template`]: Artifact path templates
//! - [`records`]: Per-dataset artifact records
//! - [`chained`]: The chained composite
//! - [`registry`]: Building backends from configuration

pub mod chained;
pub mod error;
pub mod filelike;
pub mod formatter;
pub mod memory;
pub mod object;
pub mod posix;
pub mod records;
pub mod registry;
pub mod template;
pub mod traits;
pub mod transaction;

pub use chained::ChainedBackend;
pub use error::{StoreError, StoreResult};
pub use filelike::{BlobIo, FileLikeBackend, FileRecords};
pub use formatter::{Formatter, FormatterRegistry, JsonFormatter, YamlFormatter};
pub use memory::InMemoryBackend;
pub use object::{InMemoryObjectClient, ObjectClient, ObjectStoreIo};
pub use posix::PosixIo;
pub use records::{StoredFileInfo, RECORD_KEY};
pub use registry::{
    BackendContext, BackendFactory, BackendRegistry, DatastoreComponent, DATASTORE_COMPONENT,
};
pub use template::{FileTemplate, FileTemplates, DEFAULT_TEMPLATE};
pub use traits::{DatasetUri, StorageBackend};
pub use transaction::{run_in_transaction, Transaction};
