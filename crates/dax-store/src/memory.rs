use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dax_config::ConfigTree;
use dax_types::{Dataset, DatasetId, DatasetRef, Parameters};

use crate::error::{StoreError, StoreResult};
use crate::traits::{DatasetUri, StorageBackend};
use crate::transaction::Transaction;

type Datasets = Arc<RwLock<HashMap<DatasetId, Dataset>>>;

/// In-memory, HashMap-based datastore.
///
/// Intended for tests and ephemeral repositories. Values are cloned on read
/// and write and are lost when the backend is dropped. URIs use the `mem`
/// scheme and do not address anything outside this process.
pub struct InMemoryBackend {
    name: String,
    datasets: Datasets,
    transaction: RwLock<Option<Arc<Transaction>>>,
}

impl InMemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datasets: Arc::new(RwLock::new(HashMap::new())),
            transaction: RwLock::new(None),
        }
    }

    /// Build from a `cls: inmemory` configuration node.
    pub fn from_config(config: &ConfigTree) -> StoreResult<Self> {
        Ok(Self::new(config.get_str("name").unwrap_or("inmemory")))
    }

    /// Number of stored datasets.
    pub fn len(&self) -> usize {
        self.datasets.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new("inmemory")
    }
}

impl StorageBackend for InMemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self, dataset: &DatasetRef) -> StoreResult<bool> {
        let datasets = self.datasets.read().expect("lock poisoned");
        Ok(datasets.contains_key(&dataset.id()))
    }

    fn get(&self, dataset: &DatasetRef, parameters: Option<&Parameters>) -> StoreResult<Dataset> {
        let storage_class = dataset.storage_class();
        storage_class.validate_parameters(parameters)?;
        let value = self
            .datasets
            .read()
            .expect("lock poisoned")
            .get(&dataset.id())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(dataset.to_string()))?;
        storage_class.check(&value)?;
        Ok(storage_class.apply_parameters(value, parameters)?)
    }

    fn put(&self, value: &Dataset, dataset: &DatasetRef) -> StoreResult<()> {
        dataset.storage_class().check(value)?;
        let id = dataset.id();
        {
            let mut datasets = self.datasets.write().expect("lock poisoned");
            if datasets.contains_key(&id) {
                return Err(StoreError::AlreadyExists(dataset.to_string()));
            }
            datasets.insert(id, value.clone());
        }
        tracing::debug!(backend = %self.name, %dataset, "stored dataset in memory");

        if let Some(txn) = self.transaction() {
            let datasets = Arc::clone(&self.datasets);
            txn.register(format!("{}: remove {dataset}", self.name), move || {
                datasets.write().expect("lock poisoned").remove(&id);
                Ok(())
            });
        }
        Ok(())
    }

    fn uri(&self, dataset: &DatasetRef, predict: bool) -> StoreResult<DatasetUri> {
        let type_name = dataset.dataset_type().name();
        if self.exists(dataset)? {
            return Ok(DatasetUri::actual(format!("mem://{type_name}/{}", dataset.id())));
        }
        if predict {
            return Ok(DatasetUri::predicted(format!("mem://{type_name}#predicted")));
        }
        Err(StoreError::NotFound(dataset.to_string()))
    }

    fn remove(&self, dataset: &DatasetRef) -> StoreResult<()> {
        let mut datasets = self.datasets.write().expect("lock poisoned");
        datasets
            .remove(&dataset.id())
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(dataset.to_string()))
    }

    fn set_transaction(&self, transaction: Option<Arc<Transaction>>) {
        *self.transaction.write().expect("lock poisoned") = transaction;
    }

    fn transaction(&self) -> Option<Arc<Transaction>> {
        self.transaction.read().expect("lock poisoned").clone()
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("name", &self.name)
            .field("dataset_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::run_in_transaction;
    use dax_types::{DatasetType, StorageClass, ValueKind};
    use serde_json::json;

    fn dataset(id: u64) -> DatasetRef {
        let class = StorageClass::new("StructuredData", ValueKind::Mapping)
            .with_parameters(["keys"]);
        DatasetRef::new(id, DatasetType::new("calexp", class).unwrap(), "run1")
    }

    #[test]
    fn put_get_remove() {
        let backend = InMemoryBackend::default();
        let value = json!({"a": 1, "b": 2});
        backend.put(&value, &dataset(1)).unwrap();
        assert!(backend.exists(&dataset(1)).unwrap());
        assert_eq!(backend.get(&dataset(1), None).unwrap(), value);

        backend.remove(&dataset(1)).unwrap();
        assert!(!backend.exists(&dataset(1)).unwrap());
        assert!(backend.get(&dataset(1), None).unwrap_err().is_not_found());
        assert!(backend.remove(&dataset(1)).unwrap_err().is_not_found());
    }

    #[test]
    fn put_rejects_wrong_kind_and_duplicates() {
        let backend = InMemoryBackend::default();
        assert!(matches!(
            backend.put(&json!([1, 2]), &dataset(1)),
            Err(StoreError::TypeMismatch(_))
        ));
        backend.put(&json!({}), &dataset(1)).unwrap();
        assert!(matches!(
            backend.put(&json!({}), &dataset(1)),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn parameters_select_keys() {
        let backend = InMemoryBackend::default();
        backend.put(&json!({"a": 1, "b": 2}), &dataset(1)).unwrap();
        let mut params = Parameters::new();
        params.insert("keys".into(), json!(["b"]));
        assert_eq!(backend.get(&dataset(1), Some(&params)).unwrap(), json!({"b": 2}));

        params.insert("keys".into(), json!(["missing"]));
        assert!(matches!(
            backend.get(&dataset(1), Some(&params)),
            Err(StoreError::InvalidValue(_))
        ));

        let mut unknown = Parameters::new();
        unknown.insert("bbox".into(), json!(1));
        assert!(matches!(
            backend.get(&dataset(1), Some(&unknown)),
            Err(StoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn uri_is_predicted_only_when_absent() {
        let backend = InMemoryBackend::default();
        let predicted = backend.uri(&dataset(4), true).unwrap();
        assert!(predicted.is_predicted());
        assert_eq!(predicted.as_str(), "mem://calexp#predicted");
        assert!(backend.uri(&dataset(4), false).unwrap_err().is_not_found());

        backend.put(&json!({}), &dataset(4)).unwrap();
        let actual = backend.uri(&dataset(4), true).unwrap();
        assert!(!actual.is_predicted());
        assert_eq!(actual.as_str(), "mem://calexp/4");
    }

    #[test]
    fn failed_transaction_undoes_puts() {
        let backend = InMemoryBackend::default();
        let err = run_in_transaction(&backend, |b| {
            b.put(&json!({}), &dataset(1))?;
            b.put(&json!({}), &dataset(2))?;
            Err::<(), _>(StoreError::InvalidArgument("abort".into()))
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert!(backend.is_empty());
        assert!(backend.transaction().is_none());

        run_in_transaction(&backend, |b| b.put(&json!({}), &dataset(3))).unwrap();
        assert!(backend.exists(&dataset(3)).unwrap());
    }

    #[test]
    fn transfer_from_self_is_refused() {
        let backend = InMemoryBackend::default();
        backend.put(&json!({}), &dataset(1)).unwrap();
        assert!(matches!(
            backend.transfer_from(&backend, &dataset(1)),
            Err(StoreError::InvalidArgument(_))
        ));

        let other = InMemoryBackend::new("other");
        other.transfer_from(&backend, &dataset(1)).unwrap();
        assert!(other.exists(&dataset(1)).unwrap());
    }
}
