//! Record schemas and row values.
//!
//! A [`PersistedRecord`] describes itself with a [`RecordSchema`] (ordered,
//! typed fields) and converts to and from a positional [`Row`].

use std::fmt;
use std::ops::Index;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DictError, DictResult};
use crate::names::validate_column_name;

/// Declared type of one record field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    Bytes,
    DateTime,
}

impl FieldType {
    /// Column type used in SQLite table definitions.
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Float => "REAL",
            Self::Text | Self::DateTime => "TEXT",
            Self::Bytes => "BLOB",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Bytes => "bytes",
            Self::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

/// One field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Integer(_) => FieldType::Integer,
            Self::Float(_) => FieldType::Float,
            Self::Text(_) => FieldType::Text,
            Self::Boolean(_) => FieldType::Boolean,
            Self::Bytes(_) => FieldType::Bytes,
            Self::DateTime(_) => FieldType::DateTime,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

/// One declared field: name, type and, for text, an optional maximum
/// length in characters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            max_length: None,
        }
    }

    /// A text field limited to `max_length` characters.
    pub fn text(name: impl Into<String>, max_length: usize) -> Self {
        Self {
            name: name.into(),
            ty: FieldType::Text,
            max_length: Some(max_length),
        }
    }
}

/// Ordered field declarations of a record type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    fields: Vec<FieldSpec>,
}

impl RecordSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Check the schema can back a dictionary keyed by the column `key`.
    ///
    /// Field names must be valid column names, unique without regard to
    /// ASCII case (SQLite column names are case-insensitive), and must not
    /// match the key. Only text fields may declare a maximum length.
    pub fn validate_for_key(&self, key: &str) -> DictResult<()> {
        validate_column_name(key)?;
        if self.fields.is_empty() {
            return Err(DictError::InvalidArgument(
                "record schema declares no fields".into(),
            ));
        }
        for (i, field) in self.fields.iter().enumerate() {
            validate_column_name(&field.name)?;
            if field.name.eq_ignore_ascii_case(key) {
                return Err(DictError::InvalidArgument(format!(
                    "key {key:?} duplicates a value field"
                )));
            }
            if self.fields[..i]
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(&field.name))
            {
                return Err(DictError::InvalidArgument(format!(
                    "field {:?} declared twice",
                    field.name
                )));
            }
            match (field.max_length, field.ty) {
                (Some(0), _) => {
                    return Err(DictError::InvalidArgument(format!(
                        "field {:?} has a zero maximum length",
                        field.name
                    )))
                }
                (Some(_), ty) if ty != FieldType::Text => {
                    return Err(DictError::InvalidArgument(format!(
                        "field {:?} of type {ty} cannot declare a maximum length",
                        field.name
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Check that `row` has one value per field with the declared types.
    pub fn check_types(&self, row: &Row) -> DictResult<()> {
        if row.len() != self.fields.len() {
            return Err(DictError::TypeMismatch {
                field: "<row>".into(),
                expected: format!("{} values", self.fields.len()),
                actual: format!("{} values", row.len()),
            });
        }
        for (spec, value) in self.fields.iter().zip(row.values()) {
            if value.field_type() != spec.ty {
                return Err(DictError::TypeMismatch {
                    field: spec.name.clone(),
                    expected: spec.ty.to_string(),
                    actual: value.field_type().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Check declared maximum lengths; the first violating field is named.
    pub fn check_lengths(&self, table: &str, row: &Row) -> DictResult<()> {
        for (spec, value) in self.fields.iter().zip(row.values()) {
            if let (Some(max), FieldValue::Text(text)) = (spec.max_length, value) {
                let len = text.chars().count();
                if len > max {
                    return Err(DictError::InvalidValue {
                        table: table.to_string(),
                        reason: format!("{} is {len} characters, limit is {max}", spec.name),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Field values in schema order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row(Vec<FieldValue>);

impl Row {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.0.get(index)
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.0
    }

    pub fn into_values(self) -> Vec<FieldValue> {
        self.0
    }

    fn field(&self, index: usize, expected: FieldType) -> DictResult<&FieldValue> {
        self.0.get(index).ok_or_else(|| DictError::TypeMismatch {
            field: format!("#{index}"),
            expected: expected.to_string(),
            actual: "missing".into(),
        })
    }

    fn mismatch(index: usize, expected: FieldType, actual: &FieldValue) -> DictError {
        DictError::TypeMismatch {
            field: format!("#{index}"),
            expected: expected.to_string(),
            actual: actual.field_type().to_string(),
        }
    }

    pub fn integer(&self, index: usize) -> DictResult<i64> {
        match self.field(index, FieldType::Integer)? {
            FieldValue::Integer(v) => Ok(*v),
            other => Err(Self::mismatch(index, FieldType::Integer, other)),
        }
    }

    pub fn float(&self, index: usize) -> DictResult<f64> {
        match self.field(index, FieldType::Float)? {
            FieldValue::Float(v) => Ok(*v),
            other => Err(Self::mismatch(index, FieldType::Float, other)),
        }
    }

    pub fn text(&self, index: usize) -> DictResult<&str> {
        match self.field(index, FieldType::Text)? {
            FieldValue::Text(v) => Ok(v),
            other => Err(Self::mismatch(index, FieldType::Text, other)),
        }
    }

    pub fn boolean(&self, index: usize) -> DictResult<bool> {
        match self.field(index, FieldType::Boolean)? {
            FieldValue::Boolean(v) => Ok(*v),
            other => Err(Self::mismatch(index, FieldType::Boolean, other)),
        }
    }

    pub fn bytes(&self, index: usize) -> DictResult<&[u8]> {
        match self.field(index, FieldType::Bytes)? {
            FieldValue::Bytes(v) => Ok(v),
            other => Err(Self::mismatch(index, FieldType::Bytes, other)),
        }
    }

    pub fn datetime(&self, index: usize) -> DictResult<DateTime<Utc>> {
        match self.field(index, FieldType::DateTime)? {
            FieldValue::DateTime(v) => Ok(*v),
            other => Err(Self::mismatch(index, FieldType::DateTime, other)),
        }
    }
}

impl Index<usize> for Row {
    type Output = FieldValue;

    fn index(&self, index: usize) -> &FieldValue {
        &self.0[index]
    }
}

impl From<Vec<FieldValue>> for Row {
    fn from(values: Vec<FieldValue>) -> Self {
        Self(values)
    }
}

/// A fixed-shape record that can be stored in a persisted dictionary.
pub trait PersistedRecord: Clone + Send + Sync + 'static {
    /// Field declarations, in row order. Must not change between calls.
    fn schema() -> RecordSchema;

    /// The record as a row in schema order.
    fn to_row(&self) -> Row;

    /// Rebuild a record from a row in schema order.
    fn from_row(row: Row) -> DictResult<Self>;
}
