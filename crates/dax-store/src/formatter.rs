//! Formatters: encode datasets to bytes and back for file-like backends.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dax_config::ConfigTree;
use dax_types::{Dataset, DatasetRef};

use crate::error::{StoreError, StoreResult};

/// Serialization of in-memory datasets to artifact bytes.
pub trait Formatter: Send + Sync + fmt::Debug {
    /// Identifier used in configuration and in stored records.
    fn name(&self) -> &str;

    /// File extension, including the leading dot.
    fn extension(&self) -> &str;

    fn write(&self, value: &Dataset) -> StoreResult<Vec<u8>>;

    /// Decode bytes; undecodable input is a [`StoreError::TypeMismatch`].
    fn read(&self, bytes: &[u8]) -> StoreResult<Dataset>;
}

#[derive(Debug, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn name(&self) -> &str {
        "json"
    }

    fn extension(&self) -> &str {
        ".json"
    }

    fn write(&self, value: &Dataset) -> StoreResult<Vec<u8>> {
        serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn read(&self, bytes: &[u8]) -> StoreResult<Dataset> {
        serde_json::from_slice(bytes)
            .map_err(|e| StoreError::TypeMismatch(format!("unreadable JSON artifact: {e}")))
    }
}

#[derive(Debug, Default)]
pub struct YamlFormatter;

impl Formatter for YamlFormatter {
    fn name(&self) -> &str {
        "yaml"
    }

    fn extension(&self) -> &str {
        ".yaml"
    }

    fn write(&self, value: &Dataset) -> StoreResult<Vec<u8>> {
        serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn read(&self, bytes: &[u8]) -> StoreResult<Dataset> {
        serde_yaml::from_slice(bytes)
            .map_err(|e| StoreError::TypeMismatch(format!("unreadable YAML artifact: {e}")))
    }
}

/// Chooses the formatter for each dataset.
///
/// Lookup order: the dataset type name, its parent type name, the storage
/// class name, then `default`.
#[derive(Clone, Debug)]
pub struct FormatterRegistry {
    formatters: HashMap<String, Arc<dyn Formatter>>,
    assignments: HashMap<String, String>,
    default: String,
}

impl FormatterRegistry {
    /// Built-in formatters with `json` as the default.
    pub fn new() -> Self {
        let builtin: [Arc<dyn Formatter>; 2] = [Arc::new(JsonFormatter), Arc::new(YamlFormatter)];
        Self {
            formatters: builtin
                .into_iter()
                .map(|f| (f.name().to_string(), f))
                .collect(),
            assignments: HashMap::new(),
            default: "json".into(),
        }
    }

    /// Read a `formatters` node: a mapping from dataset type or storage
    /// class name to formatter name, with the key `default` as fallback.
    pub fn from_config(config: Option<&ConfigTree>) -> StoreResult<Self> {
        let mut registry = Self::new();
        let Some(config) = config else {
            return Ok(registry);
        };
        for (key, value) in config.as_map() {
            let name = value.as_str().ok_or_else(|| {
                StoreError::InvalidArgument(format!("formatter for {key:?} must be a name"))
            })?;
            if !registry.formatters.contains_key(name) {
                return Err(StoreError::InvalidArgument(format!("unknown formatter {name:?}")));
            }
            if key == "default" {
                registry.default = name.to_string();
            } else {
                registry.assignments.insert(key.clone(), name.to_string());
            }
        }
        Ok(registry)
    }

    /// Add or replace a formatter.
    pub fn register(&mut self, formatter: Arc<dyn Formatter>) {
        self.formatters.insert(formatter.name().to_string(), formatter);
    }

    pub fn by_name(&self, name: &str) -> StoreResult<Arc<dyn Formatter>> {
        self.formatters
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::InvalidArgument(format!("unknown formatter {name:?}")))
    }

    pub fn for_dataset(&self, dataset: &DatasetRef) -> StoreResult<Arc<dyn Formatter>> {
        let dataset_type = dataset.dataset_type();
        let name = [
            dataset_type.name(),
            dataset_type.parent_name(),
            dataset.storage_class().name(),
        ]
        .into_iter()
        .find_map(|key| self.assignments.get(key))
        .unwrap_or(&self.default);
        self.by_name(name)
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dax_types::{DatasetType, StorageClass, ValueKind};
    use serde_json::json;

    fn dataset(type_name: &str, class: &str) -> DatasetRef {
        let class = StorageClass::new(class, ValueKind::Any);
        DatasetRef::new(1, DatasetType::new(type_name, class).unwrap(), "run")
    }

    #[test]
    fn lookup_prefers_type_then_class_then_default() {
        let config = ConfigTree::from_value(json!({
            "default": "yaml",
            "calexp": "json",
            "Catalog": "json",
        }))
        .unwrap();
        let registry = FormatterRegistry::from_config(Some(&config)).unwrap();
        assert_eq!(registry.for_dataset(&dataset("calexp", "X")).unwrap().name(), "json");
        assert_eq!(registry.for_dataset(&dataset("calexp.wcs", "X")).unwrap().name(), "json");
        assert_eq!(registry.for_dataset(&dataset("src", "Catalog")).unwrap().name(), "json");
        assert_eq!(registry.for_dataset(&dataset("src", "Other")).unwrap().name(), "yaml");
    }

    #[test]
    fn unknown_formatter_is_rejected() {
        let config = ConfigTree::from_value(json!({"default": "fits"})).unwrap();
        assert!(FormatterRegistry::from_config(Some(&config)).is_err());
    }

    #[test]
    fn formatters_decode_what_they_encode() {
        let value = json!({"a": [1, 2.5, "x"], "b": null});
        for formatter in [&JsonFormatter as &dyn Formatter, &YamlFormatter] {
            let bytes = formatter.write(&value).unwrap();
            assert_eq!(formatter.read(&bytes).unwrap(), value);
        }
    }

    #[test]
    fn garbage_is_a_type_mismatch() {
        assert!(matches!(
            JsonFormatter.read(b"{not json"),
            Err(StoreError::TypeMismatch(_))
        ));
    }
}
