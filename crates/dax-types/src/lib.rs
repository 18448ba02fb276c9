//! Foundation types for dax.
//!
//! Every other dax crate depends on `dax-types`. Datasets are opaque
//! in-memory values ([`Dataset`]) addressed by a [`DatasetRef`]; the ref's
//! [`DatasetType`] carries the [`StorageClass`] that describes what shape the
//! value must have once it is read back.
//!
//! # Key Types
//!
//! - [`DatasetId`]: Integer identifier of one dataset instance
//! - [`DatasetType`]: Named type, optionally a component (`parent.component`)
//! - [`DatasetRef`]: Immutable key used by every storage operation
//! - [`StorageClass`]: Declared in-memory kind plus accepted read parameters

pub mod dataset;
pub mod error;
pub mod storage_class;

pub use dataset::{DataId, DatasetId, DatasetRef, DatasetType};
pub use error::TypeError;
pub use storage_class::{Parameters, StorageClass, ValueKind};

/// An in-memory dataset value.
pub type Dataset = serde_json::Value;
