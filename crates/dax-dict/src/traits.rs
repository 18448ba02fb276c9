//! The [`PersistedDict`] trait and the key types it accepts.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{DictError, DictResult};
use crate::schema::{FieldType, FieldValue, PersistedRecord};

/// A type usable as a dictionary key column.
pub trait DictKey: Clone + Debug + Eq + Hash + Send + Sync + 'static {
    /// Column type of the key.
    fn field_type() -> FieldType;

    fn to_value(&self) -> FieldValue;

    fn from_value(value: FieldValue) -> DictResult<Self>;
}

/// Key type used when a dictionary does not choose one.
pub type DefaultKey = i64;

impl DictKey for i64 {
    fn field_type() -> FieldType {
        FieldType::Integer
    }

    fn to_value(&self) -> FieldValue {
        FieldValue::Integer(*self)
    }

    fn from_value(value: FieldValue) -> DictResult<Self> {
        match value {
            FieldValue::Integer(v) => Ok(v),
            other => Err(DictError::TypeMismatch {
                field: "<key>".into(),
                expected: FieldType::Integer.to_string(),
                actual: other.field_type().to_string(),
            }),
        }
    }
}

impl DictKey for String {
    fn field_type() -> FieldType {
        FieldType::Text
    }

    fn to_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_value(value: FieldValue) -> DictResult<Self> {
        match value {
            FieldValue::Text(v) => Ok(v),
            other => Err(DictError::TypeMismatch {
                field: "<key>".into(),
                expected: FieldType::Text.to_string(),
                actual: other.field_type().to_string(),
            }),
        }
    }
}

/// A mutable mapping from `K` to records of type `V`.
///
/// Implementations must be thread-safe (`Send + Sync`). Every operation is
/// atomic on its own; there is no multi-key transaction.
pub trait PersistedDict<K: DictKey, V: PersistedRecord>: Send + Sync {
    /// Look up the record stored under `key`.
    ///
    /// Fails with [`DictError::KeyNotFound`] if there is none.
    fn get(&self, key: &K) -> DictResult<V>;

    /// Store `value` under `key`, replacing any existing record.
    ///
    /// A value whose fields do not have the declared types fails with
    /// [`DictError::TypeMismatch`]; a violated storage constraint (such as
    /// a text length limit) fails with [`DictError::InvalidValue`].
    fn set(&self, key: &K, value: &V) -> DictResult<()>;

    /// Remove the record stored under `key`.
    ///
    /// Fails with [`DictError::KeyNotFound`] if there is none.
    fn delete(&self, key: &K) -> DictResult<()>;

    /// Iterate over the keys present when each page is read.
    ///
    /// The sequence is finite; calling `keys` again starts over.
    fn keys(&self) -> DictResult<Box<dyn Iterator<Item = DictResult<K>> + '_>>;

    /// Number of stored records.
    fn len(&self) -> DictResult<usize>;

    fn is_empty(&self) -> DictResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether a record is stored under `key`.
    fn contains(&self, key: &K) -> DictResult<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(DictError::KeyNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
