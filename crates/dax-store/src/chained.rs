//! A datastore composed of an ordered list of child datastores.
//!
//! Writes fan out to every child; reads are served by the first child that
//! has the dataset.

use std::fmt;
use std::sync::Arc;

use dax_types::{Dataset, DatasetRef, Parameters};

use crate::error::{StoreError, StoreResult};
use crate::traits::{DatasetUri, StorageBackend};
use crate::transaction::Transaction;

/// Ordered composition of child backends.
pub struct ChainedBackend {
    name: String,
    children: Vec<Box<dyn StorageBackend>>,
}

impl ChainedBackend {
    /// Fails with [`StoreError::InvalidArgument`] for an empty chain.
    pub fn new(name: impl Into<String>, children: Vec<Box<dyn StorageBackend>>) -> StoreResult<Self> {
        let name = name.into();
        if children.is_empty() {
            return Err(StoreError::InvalidArgument(format!(
                "chained datastore {name} has no children"
            )));
        }
        Ok(Self { name, children })
    }

    pub fn children(&self) -> impl Iterator<Item = &dyn StorageBackend> {
        self.children.iter().map(|child| &**child)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl StorageBackend for ChainedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self, dataset: &DatasetRef) -> StoreResult<bool> {
        for child in &self.children {
            if child.exists(dataset)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get(&self, dataset: &DatasetRef, parameters: Option<&Parameters>) -> StoreResult<Dataset> {
        for child in &self.children {
            match child.get(dataset, parameters) {
                Err(e) if e.is_not_found() => continue,
                Ok(value) => {
                    tracing::trace!(chain = %self.name, child = child.name(), %dataset, "served read");
                    return Ok(value);
                }
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::NotFound(dataset.to_string()))
    }

    /// Stores into every child in order. The first failure is returned at
    /// once; children already written keep the dataset unless the caller's
    /// transaction rolls back.
    fn put(&self, value: &Dataset, dataset: &DatasetRef) -> StoreResult<()> {
        for child in &self.children {
            child.put(value, dataset).inspect_err(|e| {
                tracing::warn!(chain = %self.name, child = child.name(), %dataset, error = %e, "chained put failed");
            })?;
        }
        Ok(())
    }

    /// URI from the first child holding the dataset; when none does, the
    /// first child's prediction.
    fn uri(&self, dataset: &DatasetRef, predict: bool) -> StoreResult<DatasetUri> {
        for child in &self.children {
            if child.exists(dataset)? {
                return child.uri(dataset, false);
            }
        }
        if predict {
            return self.children[0].uri(dataset, true);
        }
        Err(StoreError::NotFound(dataset.to_string()))
    }

    /// Removes from every child; the first failure is returned at once.
    fn remove(&self, dataset: &DatasetRef) -> StoreResult<()> {
        for child in &self.children {
            child.remove(dataset)?;
        }
        Ok(())
    }

    fn set_transaction(&self, transaction: Option<Arc<Transaction>>) {
        for child in &self.children {
            child.set_transaction(transaction.clone());
        }
    }

    fn transaction(&self) -> Option<Arc<Transaction>> {
        self.children[0].transaction()
    }
}

impl fmt::Debug for ChainedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.children.iter().map(|c| c.name()).collect();
        f.debug_struct("ChainedBackend")
            .field("name", &self.name)
            .field("children", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use crate::transaction::run_in_transaction;
    use dax_types::{DatasetType, StorageClass, ValueKind};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dataset(id: u64, kind: ValueKind) -> DatasetRef {
        let class = StorageClass::new("Data", kind);
        DatasetRef::new(id, DatasetType::new("calexp", class).unwrap(), "run1")
    }

    /// Accepts only mappings, so puts of other kinds fail at this child.
    struct MappingsOnly(InMemoryBackend);

    impl StorageBackend for MappingsOnly {
        fn name(&self) -> &str {
            "mappings-only"
        }
        fn exists(&self, dataset: &DatasetRef) -> StoreResult<bool> {
            self.0.exists(dataset)
        }
        fn get(&self, dataset: &DatasetRef, p: Option<&Parameters>) -> StoreResult<Dataset> {
            self.0.get(dataset, p)
        }
        fn put(&self, value: &Dataset, dataset: &DatasetRef) -> StoreResult<()> {
            if !value.is_object() {
                return Err(StoreError::TypeMismatch("mappings only".into()));
            }
            self.0.put(value, dataset)
        }
        fn uri(&self, dataset: &DatasetRef, predict: bool) -> StoreResult<DatasetUri> {
            self.0.uri(dataset, predict)
        }
        fn remove(&self, dataset: &DatasetRef) -> StoreResult<()> {
            self.0.remove(dataset)
        }
        fn set_transaction(&self, t: Option<Arc<Transaction>>) {
            self.0.set_transaction(t)
        }
        fn transaction(&self) -> Option<Arc<Transaction>> {
            self.0.transaction()
        }
    }

    /// Counts `get` and `exists` calls reaching the wrapped backend.
    struct Counting {
        inner: InMemoryBackend,
        gets: AtomicUsize,
        exists: AtomicUsize,
    }

    impl Counting {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                inner: InMemoryBackend::new(name),
                gets: AtomicUsize::new(0),
                exists: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> (usize, usize) {
            (self.gets.load(Ordering::SeqCst), self.exists.load(Ordering::SeqCst))
        }
    }

    impl StorageBackend for Arc<Counting> {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn exists(&self, dataset: &DatasetRef) -> StoreResult<bool> {
            self.exists.fetch_add(1, Ordering::SeqCst);
            self.inner.exists(dataset)
        }
        fn get(&self, dataset: &DatasetRef, p: Option<&Parameters>) -> StoreResult<Dataset> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(dataset, p)
        }
        fn put(&self, value: &Dataset, dataset: &DatasetRef) -> StoreResult<()> {
            self.inner.put(value, dataset)
        }
        fn uri(&self, dataset: &DatasetRef, predict: bool) -> StoreResult<DatasetUri> {
            self.inner.uri(dataset, predict)
        }
        fn remove(&self, dataset: &DatasetRef) -> StoreResult<()> {
            self.inner.remove(dataset)
        }
        fn set_transaction(&self, t: Option<Arc<Transaction>>) {
            self.inner.set_transaction(t)
        }
        fn transaction(&self) -> Option<Arc<Transaction>> {
            self.inner.transaction()
        }
    }

    fn chain() -> ChainedBackend {
        ChainedBackend::new(
            "chain",
            vec![
                Box::new(InMemoryBackend::new("c1")),
                Box::new(MappingsOnly(InMemoryBackend::new("c2"))),
            ],
        )
        .unwrap()
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert!(matches!(
            ChainedBackend::new("empty", Vec::new()),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn put_reaches_every_child() {
        let chain = chain();
        let ds = dataset(1, ValueKind::Any);
        chain.put(&json!({"a": 1}), &ds).unwrap();
        assert!(chain.children().all(|c| c.exists(&ds).unwrap()));
        assert_eq!(chain.get(&ds, None).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn get_is_served_by_the_first_holder() {
        let chain = chain();
        let ds = dataset(2, ValueKind::Any);
        let second = chain.children().nth(1).unwrap();
        second.put(&json!({"from": "c2"}), &ds).unwrap();
        assert_eq!(chain.get(&ds, None).unwrap(), json!({"from": "c2"}));
        assert!(chain.exists(&ds).unwrap());

        chain.children().next().unwrap().put(&json!({"from": "c1"}), &ds).unwrap();
        assert_eq!(chain.get(&ds, None).unwrap(), json!({"from": "c1"}));
        assert_eq!(chain.uri(&ds, false).unwrap().as_str(), "mem://calexp/2");
    }

    #[test]
    fn failed_put_leaves_earlier_children_written() {
        let chain = chain();
        let ds = dataset(3, ValueKind::Any);
        assert!(matches!(
            chain.put(&json!([1, 2]), &ds),
            Err(StoreError::TypeMismatch(_))
        ));
        let written: Vec<bool> = chain.children().map(|c| c.exists(&ds).unwrap()).collect();
        assert_eq!(written, vec![true, false]);
    }

    #[test]
    fn transaction_undoes_partial_fan_out() {
        let chain = chain();
        let ds = dataset(4, ValueKind::Any);
        assert!(run_in_transaction(&chain, |c| c.put(&json!([1]), &ds)).is_err());
        assert!(!chain.exists(&ds).unwrap());
        assert!(chain.children().all(|c| c.transaction().is_none()));
    }

    #[test]
    fn absent_dataset_uses_first_child_prediction() {
        let chain = chain();
        let ds = dataset(5, ValueKind::Any);
        let uri = chain.uri(&ds, true).unwrap();
        assert!(uri.is_predicted());
        assert_eq!(uri.as_str(), "mem://calexp#predicted");
        assert!(chain.uri(&ds, false).unwrap_err().is_not_found());
        assert!(chain.get(&ds, None).unwrap_err().is_not_found());
    }

    #[test]
    fn other_errors_stop_the_probe() {
        let chain = chain();
        let ds = dataset(6, ValueKind::Mapping);
        chain.children().nth(1).unwrap().put(&json!({}), &ds).unwrap();
        let mut params = Parameters::new();
        params.insert("bbox".into(), json!(1));
        assert!(matches!(
            chain.get(&ds, Some(&params)),
            Err(StoreError::InvalidValue(_))
        ));
    }

    #[test]
    fn transfer_copies_between_chains() {
        let source = chain();
        let target = chain();
        let ds = dataset(7, ValueKind::Any);
        source.put(&json!({"k": "v"}), &ds).unwrap();
        target.transfer_from(&source, &ds).unwrap();
        assert!(target.children().all(|c| c.exists(&ds).unwrap()));
        assert!(matches!(
            source.transfer_from(&source, &ds),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn remove_clears_every_child() {
        let chain = chain();
        let ds = dataset(8, ValueKind::Any);
        chain.put(&json!({}), &ds).unwrap();
        chain.remove(&ds).unwrap();
        assert!(!chain.exists(&ds).unwrap());
        assert!(chain.remove(&ds).unwrap_err().is_not_found());
    }

    #[test]
    fn reads_stop_at_the_first_holder() {
        let children: Vec<Arc<Counting>> = ["c1", "c2", "c3"].into_iter().map(Counting::new).collect();
        let chain = ChainedBackend::new(
            "counted",
            children.iter().map(|c| Box::new(Arc::clone(c)) as Box<dyn StorageBackend>).collect(),
        )
        .unwrap();
        let ds = dataset(9, ValueKind::Any);
        children[1].put(&json!({"from": "c2"}), &ds).unwrap();
        children[2].put(&json!({"from": "c3"}), &ds).unwrap();

        assert_eq!(chain.get(&ds, None).unwrap(), json!({"from": "c2"}));
        assert!(chain.exists(&ds).unwrap());
        assert_eq!(children[0].calls(), (1, 1));
        assert_eq!(children[1].calls(), (1, 1));
        assert_eq!(children[2].calls(), (0, 0));
    }

    #[test]
    fn remove_stops_at_a_child_without_the_dataset() {
        let chain = chain();
        let ds = dataset(10, ValueKind::Any);
        let second = chain.children().nth(1).unwrap();
        second.put(&json!({}), &ds).unwrap();

        assert!(chain.remove(&ds).unwrap_err().is_not_found());
        assert!(second.exists(&ds).unwrap());
    }
}
