//! Storage classes: the declared in-memory shape of a dataset.
//!
//! A [`StorageClass`] names a [`ValueKind`] that every value of that class
//! must have, and the set of read parameters callers may pass to `get`.
//! Two parameter families have built-in meaning:
//!
//! - `keys`: a list of keys; selects a subset of a mapping
//! - `start` / `stop`: bounds of a slice of a sequence

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// Read parameters passed alongside a `get`.
pub type Parameters = BTreeMap<String, Value>;

/// The in-memory kind a storage class declares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Mapping,
    Sequence,
    String,
    Integer,
    Float,
    Boolean,
    /// Accepts any value.
    Any,
}

impl ValueKind {
    /// The kind of a concrete value. Never returns [`ValueKind::Any`]; `null`
    /// reports as `Any` since it has no kind of its own.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Self::Mapping,
            Value::Array(_) => Self::Sequence,
            Value::String(_) => Self::String,
            Value::Number(n) if n.is_f64() => Self::Float,
            Value::Number(_) => Self::Integer,
            Value::Bool(_) => Self::Boolean,
            Value::Null => Self::Any,
        }
    }

    /// Whether `value` is acceptable for this kind. Integers satisfy `Float`.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Float => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            kind => Self::of(value) == kind,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Mapping => "mapping",
            Self::Sequence => "sequence",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Any => "any",
        };
        f.write_str(s)
    }
}

/// Declared type contract for datasets of one dataset type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageClass {
    name: String,
    kind: ValueKind,
    #[serde(default)]
    parameters: BTreeSet<String>,
}

impl StorageClass {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parameters: BTreeSet::new(),
        }
    }

    /// Declare the read parameters this storage class accepts.
    pub fn with_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn parameters(&self) -> &BTreeSet<String> {
        &self.parameters
    }

    /// Whether `value` has the kind this storage class declares.
    pub fn conforms(&self, value: &Value) -> bool {
        self.kind.accepts(value)
    }

    /// Fail with [`TypeError::KindMismatch`] unless `value` conforms.
    pub fn check(&self, value: &Value) -> Result<(), TypeError> {
        if self.conforms(value) {
            return Ok(());
        }
        Err(TypeError::KindMismatch {
            storage_class: self.name.clone(),
            expected: self.kind.to_string(),
            actual: ValueKind::of(value).to_string(),
        })
    }

    /// Reject parameters this storage class does not declare.
    pub fn validate_parameters(&self, parameters: Option<&Parameters>) -> Result<(), TypeError> {
        let Some(parameters) = parameters else {
            return Ok(());
        };
        match parameters.keys().find(|name| !self.parameters.contains(*name)) {
            Some(name) => Err(TypeError::UnsupportedParameter {
                storage_class: self.name.clone(),
                name: name.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Apply read parameters to a value that was just reconstituted.
    ///
    /// Parameters must already have passed [`Self::validate_parameters`].
    /// Declared parameters without a built-in meaning leave the value as is.
    pub fn apply_parameters(
        &self,
        value: Value,
        parameters: Option<&Parameters>,
    ) -> Result<Value, TypeError> {
        let Some(parameters) = parameters.filter(|p| !p.is_empty()) else {
            return Ok(value);
        };
        let mut value = value;
        if let Some(keys) = parameters.get("keys") {
            value = select_keys(value, keys)?;
        }
        if parameters.contains_key("start") || parameters.contains_key("stop") {
            value = slice(value, parameters.get("start"), parameters.get("stop"))?;
        }
        Ok(value)
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> TypeError {
    TypeError::InvalidParameter {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn select_keys(value: Value, keys: &Value) -> Result<Value, TypeError> {
    let Value::Object(mut map) = value else {
        return Err(invalid("keys", "value is not a mapping"));
    };
    let Value::Array(keys) = keys else {
        return Err(invalid("keys", "expected a list of keys"));
    };
    let mut selected = serde_json::Map::new();
    for key in keys {
        let key = key
            .as_str()
            .ok_or_else(|| invalid("keys", format!("key {key} is not a string")))?;
        let item = map
            .remove(key)
            .ok_or_else(|| invalid("keys", format!("key {key:?} not present in dataset")))?;
        selected.insert(key.to_string(), item);
    }
    Ok(Value::Object(selected))
}

fn bound(name: &str, value: Option<&Value>, default: usize) -> Result<usize, TypeError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| invalid(name, format!("expected a non-negative integer, got {v}"))),
    }
}

fn slice(value: Value, start: Option<&Value>, stop: Option<&Value>) -> Result<Value, TypeError> {
    let Value::Array(items) = value else {
        return Err(invalid("start", "value is not a sequence"));
    };
    let len = items.len();
    let start = bound("start", start, 0)?;
    let stop = bound("stop", stop, len)?;
    if start > stop || stop > len {
        return Err(invalid(
            "stop",
            format!("slice {start}..{stop} out of range for length {len}"),
        ));
    }
    Ok(Value::Array(items[start..stop].to_vec()))
}
