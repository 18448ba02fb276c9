//! The [`StorageBackend`] trait every datastore implements.

use std::fmt;
use std::sync::Arc;

use dax_types::{Dataset, DatasetRef, Parameters};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::transaction::Transaction;

/// A dataset URI, tagged when it only predicts where the dataset would go.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetUri {
    uri: String,
    predicted: bool,
}

impl DatasetUri {
    /// URI of a stored dataset.
    pub fn actual(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            predicted: false,
        }
    }

    /// URI a dataset would have if it were stored. No I/O was performed
    /// against it.
    pub fn predicted(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            predicted: true,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.uri
    }

    pub fn is_predicted(&self) -> bool {
        self.predicted
    }

    pub fn into_string(self) -> String {
        self.uri
    }
}

impl fmt::Display for DatasetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// A datastore: stores and retrieves in-memory datasets by reference.
///
/// Implementations must be thread-safe (`Send + Sync`). Each call is atomic
/// on its own; writes made while a [`Transaction`] is installed register a
/// compensating action with it.
pub trait StorageBackend: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Whether the dataset is stored here.
    fn exists(&self, dataset: &DatasetRef) -> StoreResult<bool>;

    /// Read a dataset back into memory.
    ///
    /// Fails with [`StoreError::NotFound`] when absent,
    /// [`StoreError::TypeMismatch`] when the stored data cannot be
    /// reconstituted into the declared type, and [`StoreError::InvalidValue`]
    /// when `parameters` are inconsistent with the stored data.
    fn get(&self, dataset: &DatasetRef, parameters: Option<&Parameters>) -> StoreResult<Dataset>;

    /// Store `value` under `dataset`.
    fn put(&self, value: &Dataset, dataset: &DatasetRef) -> StoreResult<()>;

    /// URI of the dataset. When it is absent, `predict` returns the URI it
    /// would have, tagged as predicted; otherwise the call fails with
    /// [`StoreError::NotFound`].
    fn uri(&self, dataset: &DatasetRef, predict: bool) -> StoreResult<DatasetUri>;

    /// Delete the dataset; fails with [`StoreError::NotFound`] when absent.
    fn remove(&self, dataset: &DatasetRef) -> StoreResult<()>;

    /// Install (or clear) the transaction later writes register with.
    fn set_transaction(&self, transaction: Option<Arc<Transaction>>);

    /// The currently installed transaction.
    fn transaction(&self) -> Option<Arc<Transaction>>;

    /// Copy one dataset from `source` into this backend.
    ///
    /// Refuses to transfer from the same instance.
    fn transfer_from(&self, source: &dyn StorageBackend, dataset: &DatasetRef) -> StoreResult<()> {
        if std::ptr::addr_eq(self, source) {
            return Err(StoreError::InvalidArgument(format!(
                "cannot transfer {dataset} from {} to itself",
                self.name()
            )));
        }
        let value = source.get(dataset, None)?;
        tracing::debug!(%dataset, from = source.name(), to = self.name(), "transferring dataset");
        self.put(&value, dataset)
    }
}
