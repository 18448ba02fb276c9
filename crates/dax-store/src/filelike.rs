//! Datastores that write one artifact per dataset.
//!
//! [`FileLikeBackend`] owns the policy (templates, formatters, records,
//! integrity checks); a [`BlobIo`] owns the bytes. The filesystem and
//! object-store backends differ only in their `BlobIo`.

use std::fmt;
use std::sync::{Arc, RwLock};

use dax_dict::{DictError, PersistedDict};
use dax_location::{Location, LocationFactory, Scheme};
use dax_types::{Dataset, DatasetRef, Parameters};

use crate::error::{StoreError, StoreResult};
use crate::formatter::{Formatter, FormatterRegistry};
use crate::records::{record_key, StoredFileInfo};
use crate::template::FileTemplates;
use crate::traits::{DatasetUri, StorageBackend};
use crate::transaction::Transaction;

/// Byte-level access to artifacts at resolved locations.
pub trait BlobIo: Send + Sync + fmt::Debug {
    /// Scheme of the locations this I/O layer accepts.
    fn scheme(&self) -> Scheme;

    fn exists(&self, location: &Location) -> StoreResult<bool>;

    /// The artifact's bytes, or `None` when nothing is stored there.
    fn read(&self, location: &Location) -> StoreResult<Option<Vec<u8>>>;

    /// Atomically create the artifact. Fails with
    /// [`StoreError::AlreadyExists`] if one is already present.
    fn write_new(&self, location: &Location, bytes: &[u8]) -> StoreResult<()>;

    /// Returns whether an artifact was deleted.
    fn delete(&self, location: &Location) -> StoreResult<bool>;
}

/// Records table shared by a file-like backend and its undo actions.
pub type FileRecords = Arc<dyn PersistedDict<i64, StoredFileInfo>>;

/// A datastore writing formatted artifacts through a [`BlobIo`].
pub struct FileLikeBackend {
    name: String,
    io: Arc<dyn BlobIo>,
    locations: LocationFactory,
    templates: FileTemplates,
    formatters: FormatterRegistry,
    records: FileRecords,
    transaction: RwLock<Option<Arc<Transaction>>>,
}

impl FileLikeBackend {
    /// Fails with [`StoreError::InvalidArgument`] when `io` and `locations`
    /// disagree on the scheme.
    pub fn new(
        name: impl Into<String>,
        io: Arc<dyn BlobIo>,
        locations: LocationFactory,
        records: FileRecords,
    ) -> StoreResult<Self> {
        if io.scheme() != locations.scheme() {
            return Err(StoreError::InvalidArgument(format!(
                "{} I/O cannot serve root {}",
                io.scheme(),
                locations.root_uri()
            )));
        }
        Ok(Self {
            name: name.into(),
            io,
            locations,
            templates: FileTemplates::from_config(None)?,
            formatters: FormatterRegistry::new(),
            records,
            transaction: RwLock::new(None),
        })
    }

    pub fn with_templates(mut self, templates: FileTemplates) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_formatters(mut self, formatters: FormatterRegistry) -> Self {
        self.formatters = formatters;
        self
    }

    pub fn locations(&self) -> &LocationFactory {
        &self.locations
    }

    /// Where `dataset` would be written, with the formatter's extension.
    fn planned_location(
        &self,
        dataset: &DatasetRef,
        formatter: &dyn Formatter,
    ) -> StoreResult<Location> {
        let path = self.templates.for_dataset(dataset).format(dataset)?;
        let mut location = self.locations.from_path(&path)?;
        location.update_extension(Some(formatter.extension()));
        Ok(location)
    }

    fn record(&self, dataset: &DatasetRef) -> StoreResult<Option<(StoredFileInfo, Location)>> {
        match self.records.get(&record_key(dataset.id())?) {
            Ok(info) => {
                let location = self.locations.from_path(&info.path)?;
                Ok(Some((info, location)))
            }
            Err(DictError::KeyNotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn require_record(&self, dataset: &DatasetRef) -> StoreResult<(StoredFileInfo, Location)> {
        self.record(dataset)?
            .ok_or_else(|| StoreError::NotFound(dataset.to_string()))
    }
}

impl StorageBackend for FileLikeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self, dataset: &DatasetRef) -> StoreResult<bool> {
        match self.record(dataset)? {
            Some((_, location)) => self.io.exists(&location),
            None => Ok(false),
        }
    }

    fn get(&self, dataset: &DatasetRef, parameters: Option<&Parameters>) -> StoreResult<Dataset> {
        let storage_class = dataset.storage_class();
        storage_class.validate_parameters(parameters)?;
        let (info, location) = self.require_record(dataset)?;

        let Some(bytes) = self.io.read(&location)? else {
            tracing::warn!(backend = %self.name, %dataset, %location, "recorded artifact is missing");
            return Err(StoreError::NotFound(dataset.to_string()));
        };
        info.verify(&bytes).map_err(|reason| StoreError::Integrity {
            dataset: dataset.to_string(),
            reason,
        })?;

        let value = self.formatters.by_name(&info.formatter)?.read(&bytes)?;
        storage_class.check(&value)?;
        tracing::debug!(backend = %self.name, %dataset, %location, "read dataset");
        Ok(storage_class.apply_parameters(value, parameters)?)
    }

    fn put(&self, value: &Dataset, dataset: &DatasetRef) -> StoreResult<()> {
        let storage_class = dataset.storage_class();
        storage_class.check(value)?;
        let key = record_key(dataset.id())?;
        if self.records.contains(&key)? {
            return Err(StoreError::AlreadyExists(dataset.to_string()));
        }

        let formatter = self.formatters.for_dataset(dataset)?;
        let location = self.planned_location(dataset, formatter.as_ref())?;
        let bytes = formatter.write(value)?;
        self.io.write_new(&location, &bytes)?;

        let info = StoredFileInfo::new(
            location.path_in_store(),
            formatter.name(),
            storage_class.name(),
            &bytes,
        );
        if let Err(e) = self.records.set(&key, &info) {
            if let Err(cleanup) = self.io.delete(&location) {
                tracing::warn!(%location, error = %cleanup, "could not remove unrecorded artifact");
            }
            return Err(e.into());
        }
        tracing::debug!(
            backend = %self.name,
            %dataset,
            %location,
            size = info.file_size,
            "stored dataset"
        );

        if let Some(txn) = self.transaction() {
            let records = Arc::clone(&self.records);
            let io = Arc::clone(&self.io);
            txn.register(format!("{}: remove {dataset}", self.name), move || {
                match records.delete(&key) {
                    Ok(()) | Err(DictError::KeyNotFound { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
                io.delete(&location)?;
                Ok(())
            });
        }
        Ok(())
    }

    fn uri(&self, dataset: &DatasetRef, predict: bool) -> StoreResult<DatasetUri> {
        if let Some((_, location)) = self.record(dataset)? {
            return Ok(DatasetUri::actual(location.uri()));
        }
        if !predict {
            return Err(StoreError::NotFound(dataset.to_string()));
        }
        let formatter = self.formatters.for_dataset(dataset)?;
        let location = self.planned_location(dataset, formatter.as_ref())?;
        Ok(DatasetUri::predicted(format!("{}#predicted", location.uri())))
    }

    fn remove(&self, dataset: &DatasetRef) -> StoreResult<()> {
        let (_, location) = self.require_record(dataset)?;
        if !self.io.delete(&location)? {
            tracing::warn!(%dataset, %location, "artifact was already gone");
        }
        self.records.delete(&record_key(dataset.id())?)?;
        tracing::debug!(backend = %self.name, %dataset, "removed dataset");
        Ok(())
    }

    fn set_transaction(&self, transaction: Option<Arc<Transaction>>) {
        *self.transaction.write().expect("lock poisoned") = transaction;
    }

    fn transaction(&self) -> Option<Arc<Transaction>> {
        self.transaction.read().expect("lock poisoned").clone()
    }
}

impl fmt::Debug for FileLikeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLikeBackend")
            .field("name", &self.name)
            .field("root", &self.locations.root_uri())
            .field("io", &self.io)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chained::ChainedBackend;
    use crate::memory::InMemoryBackend;
    use crate::object::{InMemoryObjectClient, ObjectClient, ObjectStoreIo};
    use crate::posix::PosixIo;
    use crate::records::RECORD_KEY;
    use crate::transaction::run_in_transaction;
    use dax_config::ConfigTree;
    use dax_dict::InMemoryDict;
    use dax_types::{DataId, DatasetType, StorageClass, ValueKind};
    use serde_json::json;
    use tempfile::TempDir;

    fn records() -> FileRecords {
        Arc::new(InMemoryDict::<i64, StoredFileInfo>::new(RECORD_KEY).unwrap())
    }

    fn posix() -> (TempDir, FileLikeBackend) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap().to_string();
        let io = Arc::new(PosixIo::new(&root, false).unwrap());
        let backend =
            FileLikeBackend::new("posix", io, LocationFactory::new(&root).unwrap(), records())
                .unwrap();
        (dir, backend)
    }

    fn dataset(id: u64) -> DatasetRef {
        let class = StorageClass::new("StructuredData", ValueKind::Mapping)
            .with_parameters(["keys"]);
        DatasetRef::new(id, DatasetType::new("calexp", class).unwrap(), "run1")
    }

    #[test]
    fn put_then_get_round_trips_through_the_filesystem() {
        let (dir, backend) = posix();
        let value = json!({"a": 1, "b": [1, 2]});
        backend.put(&value, &dataset(1)).unwrap();

        assert!(dir.path().join("run1/calexp/calexp_1.json").is_file());
        assert!(backend.exists(&dataset(1)).unwrap());
        assert_eq!(backend.get(&dataset(1), None).unwrap(), value);

        let mut params = Parameters::new();
        params.insert("keys".into(), json!(["a"]));
        assert_eq!(backend.get(&dataset(1), Some(&params)).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn duplicates_and_wrong_kinds_are_refused() {
        let (_dir, backend) = posix();
        assert!(matches!(
            backend.put(&json!("text"), &dataset(1)),
            Err(StoreError::TypeMismatch(_))
        ));
        backend.put(&json!({}), &dataset(1)).unwrap();
        assert!(matches!(
            backend.put(&json!({}), &dataset(1)),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn tampered_artifact_fails_integrity_and_missing_one_is_not_found() {
        let (dir, backend) = posix();
        backend.put(&json!({"a": 1}), &dataset(1)).unwrap();
        let file = dir.path().join("run1/calexp/calexp_1.json");

        std::fs::write(&file, b"{\"a\": 2}").unwrap();
        assert!(matches!(
            backend.get(&dataset(1), None),
            Err(StoreError::Integrity { .. })
        ));

        std::fs::remove_file(&file).unwrap();
        assert!(!backend.exists(&dataset(1)).unwrap());
        assert!(matches!(
            backend.get(&dataset(1), None),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn chain_falls_back_past_a_missing_artifact() {
        let (dir, backend) = posix();
        let chain = ChainedBackend::new(
            "chain",
            vec![Box::new(backend), Box::new(InMemoryBackend::new("mem"))],
        )
        .unwrap();
        chain.put(&json!({"a": 1}), &dataset(8)).unwrap();
        std::fs::remove_file(dir.path().join("run1/calexp/calexp_8.json")).unwrap();

        assert!(chain.exists(&dataset(8)).unwrap());
        assert_eq!(chain.get(&dataset(8), None).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn records_survive_a_reopen_in_a_shared_registry() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("registry.sqlite3");
        let root = dir.path().join("store");
        std::fs::create_dir(&root).unwrap();
        let root = root.to_str().unwrap().to_string();
        let open = || {
            let dicts = dax_dict::DictRegistry::open(db.to_str().unwrap()).unwrap();
            let records: FileRecords =
                Arc::new(dicts.make_dict::<i64, StoredFileInfo>("posix_records", RECORD_KEY).unwrap());
            let io = Arc::new(PosixIo::new(&root, false).unwrap());
            FileLikeBackend::new("posix", io, LocationFactory::new(&root).unwrap(), records)
                .unwrap()
        };

        open().put(&json!({"a": 1}), &dataset(9)).unwrap();
        let reopened = open();
        assert!(reopened.exists(&dataset(9)).unwrap());
        assert_eq!(reopened.get(&dataset(9), None).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn uri_reports_actual_or_predicted() {
        let (dir, backend) = posix();
        let predicted = backend.uri(&dataset(2), true).unwrap();
        assert!(predicted.is_predicted());
        assert!(predicted.as_str().ends_with("run1/calexp/calexp_2.json#predicted"));
        assert!(backend.uri(&dataset(2), false).unwrap_err().is_not_found());

        backend.put(&json!({}), &dataset(2)).unwrap();
        let actual = backend.uri(&dataset(2), false).unwrap();
        assert!(!actual.is_predicted());
        let expected = dir.path().join("run1/calexp/calexp_2.json");
        assert!(actual.as_str().starts_with("file://"));
        assert!(actual.as_str().ends_with(expected.to_str().unwrap()));
    }

    #[test]
    fn remove_deletes_artifact_and_record() {
        let (dir, backend) = posix();
        backend.put(&json!({}), &dataset(3)).unwrap();
        backend.remove(&dataset(3)).unwrap();
        assert!(!dir.path().join("run1/calexp/calexp_3.json").exists());
        assert!(backend.get(&dataset(3), None).unwrap_err().is_not_found());
        assert!(backend.remove(&dataset(3)).unwrap_err().is_not_found());
    }

    #[test]
    fn unrecordable_put_leaves_no_artifact() {
        let (dir, backend) = posix();
        let templates =
            ConfigTree::from_value(json!({"default": "{run}/{a}/{b}/{c}_{id}"})).unwrap();
        let backend = backend.with_templates(FileTemplates::from_config(Some(&templates)).unwrap());
        let segment = "v".repeat(100);
        let data_id: DataId = ["a", "b", "c"]
            .into_iter()
            .map(|k| (k.to_string(), segment.clone()))
            .collect();
        let long = dataset(4).with_data_id(data_id);

        assert!(matches!(
            backend.put(&json!({}), &long),
            Err(StoreError::Dict(DictError::InvalidValue { .. }))
        ));
        let artifact = dir
            .path()
            .join("run1")
            .join(&segment)
            .join(&segment)
            .join(format!("{segment}_4.json"));
        assert!(!artifact.exists());
        assert!(!backend.exists(&long).unwrap());
    }

    #[test]
    fn rollback_removes_record_and_artifact() {
        let (dir, backend) = posix();
        let err = run_in_transaction(&backend, |b| {
            b.put(&json!({}), &dataset(5))?;
            Err::<(), _>(StoreError::InvalidArgument("abort".into()))
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert!(!backend.exists(&dataset(5)).unwrap());
        assert!(!dir.path().join("run1/calexp/calexp_5.json").exists());
    }

    #[test]
    fn object_store_backend_writes_under_the_prefix() {
        let client = InMemoryObjectClient::new();
        client.create_bucket("bucket");
        let io = Arc::new(ObjectStoreIo::new(Arc::new(client.clone()), "bucket").unwrap());
        let locations = LocationFactory::new("s3://bucket/repo").unwrap();
        let backend = FileLikeBackend::new("s3", io, locations, records()).unwrap();

        backend.put(&json!({"x": true}), &dataset(6)).unwrap();
        assert!(client.exists("bucket", "repo/run1/calexp/calexp_6.json").unwrap());
        assert_eq!(
            backend.uri(&dataset(6), false).unwrap().as_str(),
            "s3://bucket/repo/run1/calexp/calexp_6.json"
        );
        assert_eq!(backend.get(&dataset(6), None).unwrap(), json!({"x": true}));
    }

    #[test]
    fn scheme_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let io = Arc::new(PosixIo::new(dir.path(), false).unwrap());
        let locations = LocationFactory::new("s3://bucket/repo").unwrap();
        assert!(matches!(
            FileLikeBackend::new("bad", io, locations, records()),
            Err(StoreError::InvalidArgument(_))
        ));
    }
}
