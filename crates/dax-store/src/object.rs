//! Blob I/O against an object store.
//!
//! The store itself sits behind [`ObjectClient`]; [`InMemoryObjectClient`]
//! is a process-local implementation used for tests and ephemeral
//! repositories.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use dax_location::{Location, Scheme};

use crate::error::{StoreError, StoreResult};
use crate::filelike::BlobIo;

/// Minimal object-store client: buckets of byte objects addressed by key.
pub trait ObjectClient: Send + Sync + fmt::Debug {
    fn bucket_exists(&self, bucket: &str) -> StoreResult<bool>;

    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool>;

    /// The object's bytes, or `None` when there is no such object.
    fn get(&self, bucket: &str, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Create the object unless it exists. Returns whether it was created.
    fn put_if_absent(&self, bucket: &str, key: &str, bytes: &[u8]) -> StoreResult<bool>;

    /// Returns whether an object was deleted.
    fn delete(&self, bucket: &str, key: &str) -> StoreResult<bool>;
}

#[derive(Debug, Default)]
struct Buckets {
    names: HashSet<String>,
    objects: HashMap<(String, String), Vec<u8>>,
}

/// An [`ObjectClient`] holding objects in process memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryObjectClient {
    inner: Arc<RwLock<Buckets>>,
}

impl InMemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.inner
            .write()
            .expect("lock poisoned")
            .names
            .insert(bucket.to_string());
    }

    /// Number of objects across all buckets.
    pub fn object_count(&self) -> usize {
        self.inner.read().expect("lock poisoned").objects.len()
    }

    fn no_bucket(bucket: &str) -> StoreError {
        StoreError::Client(format!("no such bucket: {bucket}"))
    }
}

impl ObjectClient for InMemoryObjectClient {
    fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        Ok(self.inner.read().expect("lock poisoned").names.contains(bucket))
    }

    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner
            .objects
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    fn get(&self, bucket: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let inner = self.inner.read().expect("lock poisoned");
        if !inner.names.contains(bucket) {
            return Err(Self::no_bucket(bucket));
        }
        Ok(inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    fn put_if_absent(&self, bucket: &str, key: &str, bytes: &[u8]) -> StoreResult<bool> {
        let mut inner = self.inner.write().expect("lock poisoned");
        if !inner.names.contains(bucket) {
            return Err(Self::no_bucket(bucket));
        }
        let slot = (bucket.to_string(), key.to_string());
        if inner.objects.contains_key(&slot) {
            return Ok(false);
        }
        inner.objects.insert(slot, bytes.to_vec());
        Ok(true)
    }

    fn delete(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().expect("lock poisoned");
        Ok(inner
            .objects
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some())
    }
}

/// Reads and writes artifacts as objects in one bucket.
#[derive(Debug, Clone)]
pub struct ObjectStoreIo {
    client: Arc<dyn ObjectClient>,
    bucket: String,
}

impl ObjectStoreIo {
    /// Fails with [`StoreError::InvalidArgument`] when the bucket does not
    /// exist.
    pub fn new(client: Arc<dyn ObjectClient>, bucket: impl Into<String>) -> StoreResult<Self> {
        let bucket = bucket.into();
        if !client.bucket_exists(&bucket)? {
            return Err(StoreError::InvalidArgument(format!(
                "bucket {bucket:?} does not exist"
            )));
        }
        Ok(Self { client, bucket })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn key(location: &Location) -> String {
        location.path().trim_start_matches('/').to_string()
    }
}

impl BlobIo for ObjectStoreIo {
    fn scheme(&self) -> Scheme {
        Scheme::ObjectStore
    }

    fn exists(&self, location: &Location) -> StoreResult<bool> {
        self.client.exists(&self.bucket, &Self::key(location))
    }

    fn read(&self, location: &Location) -> StoreResult<Option<Vec<u8>>> {
        self.client.get(&self.bucket, &Self::key(location))
    }

    fn write_new(&self, location: &Location, bytes: &[u8]) -> StoreResult<()> {
        let key = Self::key(location);
        if !self.client.put_if_absent(&self.bucket, &key, bytes)? {
            return Err(StoreError::AlreadyExists(location.uri().to_string()));
        }
        tracing::debug!(bucket = %self.bucket, %key, size = bytes.len(), "uploaded artifact");
        Ok(())
    }

    fn delete(&self, location: &Location) -> StoreResult<bool> {
        self.client.delete(&self.bucket, &Self::key(location))
    }
}
