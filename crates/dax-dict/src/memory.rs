//! In-memory persisted dictionary for tests and ephemeral repositories.
//!
//! [`InMemoryDict`] keeps records in a `HashMap` behind a `RwLock` and
//! enforces the same schema rules as the table-backed implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{DictError, DictResult};
use crate::schema::{PersistedRecord, RecordSchema};
use crate::traits::{DictKey, PersistedDict};

/// An in-memory implementation of [`PersistedDict`].
///
/// Records are stored as given; data is lost when the dictionary is dropped.
#[derive(Debug)]
pub struct InMemoryDict<K: DictKey, V: PersistedRecord> {
    name: String,
    schema: RecordSchema,
    records: RwLock<HashMap<K, V>>,
}

impl<K: DictKey, V: PersistedRecord> InMemoryDict<K, V> {
    /// Create an empty dictionary whose key column is named `key`.
    pub fn new(key: &str) -> DictResult<Self> {
        Self::named("memory", key)
    }

    /// Create an empty dictionary with a name used in error messages.
    pub fn named(name: &str, key: &str) -> DictResult<Self> {
        let schema = V::schema();
        schema.validate_for_key(key)?;
        Ok(Self {
            name: name.to_string(),
            schema,
            records: RwLock::new(HashMap::new()),
        })
    }

    fn not_found(&self, key: &K) -> DictError {
        DictError::KeyNotFound {
            table: self.name.clone(),
            key: format!("{key:?}"),
        }
    }
}

impl<K: DictKey, V: PersistedRecord> PersistedDict<K, V> for InMemoryDict<K, V> {
    fn get(&self, key: &K) -> DictResult<V> {
        let records = self.records.read().expect("lock poisoned");
        records.get(key).cloned().ok_or_else(|| self.not_found(key))
    }

    fn set(&self, key: &K, value: &V) -> DictResult<()> {
        let row = value.to_row();
        self.schema.check_types(&row)?;
        self.schema.check_lengths(&self.name, &row)?;
        let mut records = self.records.write().expect("lock poisoned");
        records.insert(key.clone(), value.clone());
        Ok(())
    }

    fn delete(&self, key: &K) -> DictResult<()> {
        let mut records = self.records.write().expect("lock poisoned");
        records
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| self.not_found(key))
    }

    fn keys(&self) -> DictResult<Box<dyn Iterator<Item = DictResult<K>> + '_>> {
        let keys: Vec<K> = self
            .records
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn len(&self) -> DictResult<usize> {
        Ok(self.records.read().expect("lock poisoned").len())
    }
}
