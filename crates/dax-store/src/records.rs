//! Per-dataset artifact records kept by file-like backends.

use dax_dict::{DictResult, FieldSpec, FieldType, FieldValue, PersistedRecord, RecordSchema, Row};
use dax_types::DatasetId;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Key column of the records table.
pub const RECORD_KEY: &str = "dataset_id";

/// Where and how one dataset's artifact was written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFileInfo {
    /// Root-relative artifact path.
    pub path: String,
    pub formatter: String,
    pub storage_class: String,
    pub file_size: u64,
    /// BLAKE3 digest of the artifact bytes, hex encoded.
    pub checksum: String,
}

impl StoredFileInfo {
    pub fn new(
        path: impl Into<String>,
        formatter: impl Into<String>,
        storage_class: impl Into<String>,
        bytes: &[u8],
    ) -> Self {
        Self {
            path: path.into(),
            formatter: formatter.into(),
            storage_class: storage_class.into(),
            file_size: bytes.len() as u64,
            checksum: checksum(bytes),
        }
    }

    /// Compare `bytes` against the recorded size and digest.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), String> {
        if bytes.len() as u64 != self.file_size {
            return Err(format!(
                "size {} does not match recorded {}",
                bytes.len(),
                self.file_size
            ));
        }
        let actual = checksum(bytes);
        if actual != self.checksum {
            return Err(format!("checksum {actual} does not match recorded {}", self.checksum));
        }
        Ok(())
    }
}

pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

/// The record key for a dataset id.
pub fn record_key(id: DatasetId) -> StoreResult<i64> {
    i64::try_from(id.get()).map_err(|_| {
        StoreError::InvalidArgument(format!("dataset id {id} exceeds the record key range"))
    })
}

impl PersistedRecord for StoredFileInfo {
    fn schema() -> RecordSchema {
        RecordSchema::new(vec![
            FieldSpec::text("path", 256),
            FieldSpec::text("formatter", 64),
            FieldSpec::text("storage_class", 64),
            FieldSpec::new("file_size", FieldType::Integer),
            FieldSpec::text("checksum", 64),
        ])
    }

    fn to_row(&self) -> Row {
        Row::new(vec![
            FieldValue::Text(self.path.clone()),
            FieldValue::Text(self.formatter.clone()),
            FieldValue::Text(self.storage_class.clone()),
            FieldValue::Integer(i64::try_from(self.file_size).unwrap_or(i64::MAX)),
            FieldValue::Text(self.checksum.clone()),
        ])
    }

    fn from_row(row: Row) -> DictResult<Self> {
        Ok(Self {
            path: row.text(0)?.to_string(),
            formatter: row.text(1)?.to_string(),
            storage_class: row.text(2)?.to_string(),
            file_size: row.integer(3)?.max(0) as u64,
            checksum: row.text(4)?.to_string(),
        })
    }
}
