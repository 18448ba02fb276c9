use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::storage_class::StorageClass;

/// Data-id values that identify a dataset within its type (e.g. `visit=42`).
pub type DataId = BTreeMap<String, String>;

/// Integer identifier of a single dataset instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId(u64);

impl DatasetId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for DatasetId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named dataset type and the storage class its values belong to.
///
/// A dotted name (`calexp.wcs`) designates a component of a composite
/// parent type; [`DatasetType::component`] returns the part after the first
/// dot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetType {
    name: String,
    storage_class: StorageClass,
}

impl DatasetType {
    /// Create a dataset type, validating its name.
    ///
    /// Names are non-empty, made of ASCII alphanumerics, `_` and `-`, with
    /// `.` allowed only as a separator between non-empty parts.
    pub fn new(name: impl Into<String>, storage_class: StorageClass) -> Result<Self, TypeError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.split('.').all(|part| {
                !part.is_empty()
                    && part
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            });
        if !valid {
            return Err(TypeError::InvalidName(name));
        }
        Ok(Self {
            name,
            storage_class,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_class(&self) -> &StorageClass {
        &self.storage_class
    }

    /// The parent type name (everything before the first dot).
    pub fn parent_name(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    /// The component name, if this type names a component.
    pub fn component(&self) -> Option<&str> {
        self.name.split_once('.').map(|(_, component)| component)
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.storage_class.name())
    }
}

/// Reference to one dataset: the key for all storage operations.
///
/// Immutable after creation. Two refs are equal when every field is equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetRef {
    id: DatasetId,
    dataset_type: DatasetType,
    run: String,
    data_id: DataId,
}

impl DatasetRef {
    pub fn new(id: impl Into<DatasetId>, dataset_type: DatasetType, run: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dataset_type,
            run: run.into(),
            data_id: DataId::new(),
        }
    }

    /// Return a copy of this ref carrying the given data id.
    pub fn with_data_id(mut self, data_id: DataId) -> Self {
        self.data_id = data_id;
        self
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn dataset_type(&self) -> &DatasetType {
        &self.dataset_type
    }

    pub fn storage_class(&self) -> &StorageClass {
        self.dataset_type.storage_class()
    }

    /// Name of the run (output collection) this dataset was produced in.
    pub fn run(&self) -> &str {
        &self.run
    }

    pub fn data_id(&self) -> &DataId {
        &self.data_id
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DatasetRef({}, id={}, run={})",
            self.dataset_type.name(),
            self.id,
            self.run
        )
    }
}
