//! [`ConfigTree`]: a nested key/value mapping with dotted-key access.
//!
//! Keys address nested mappings with `.` separators, so
//! `tree.get("datastore.root")` reads `root` inside the `datastore`
//! mapping. Two merge operations exist:
//!
//! - [`ConfigTree::update`]: deep merge where the other tree wins
//! - [`ConfigTree::merge`]: deep merge that only fills missing keys

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};

/// File loaded when a configuration source names a directory.
pub const DEFAULT_CONFIG_FILE: &str = "repository.yaml";

/// On-disk configuration formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick a format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// A nested configuration mapping.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree {
    data: Map<String, Value>,
}

impl ConfigTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from a JSON value. `null` yields an empty tree; any
    /// other non-mapping value is rejected.
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        match value {
            Value::Object(data) => Ok(Self { data }),
            Value::Null => Ok(Self::new()),
            _ => Err(ConfigError::NotAMapping { key: String::new() }),
        }
    }

    /// Parse configuration text in the given format.
    pub fn parse(text: &str, format: ConfigFormat, origin: &Path) -> ConfigResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let parse_err = |reason: String| ConfigError::Parse {
            path: origin.to_path_buf(),
            reason,
        };
        let value: Value = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(text).map_err(|e| parse_err(e.to_string()))?,
            ConfigFormat::Json => serde_json::from_str(text).map_err(|e| parse_err(e.to_string()))?,
            ConfigFormat::Toml => toml::from_str(text).map_err(|e| parse_err(e.to_string()))?,
        };
        Self::from_value(value).map_err(|_| parse_err("top level is not a mapping".into()))
    }

    /// Load a configuration file. A directory loads [`DEFAULT_CONFIG_FILE`]
    /// inside it.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let mut path: PathBuf = path.as_ref().to_path_buf();
        if path.is_dir() {
            path = path.join(DEFAULT_CONFIG_FILE);
        }
        let format =
            ConfigFormat::from_path(&path).ok_or_else(|| ConfigError::UnsupportedFormat(path.clone()))?;
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), ?format, "loaded config file");
        Self::parse(&text, format, &path)
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Top-level keys in storage order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Read the value at a dotted key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let first = parts.next()?;
        let mut current = self.data.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Read a nested mapping as its own tree.
    pub fn get_tree(&self, key: &str) -> ConfigResult<Option<ConfigTree>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(Self { data: map.clone() })),
            Some(_) => Err(ConfigError::NotAMapping { key: key.to_string() }),
        }
    }

    /// Read a sequence of nested mappings (e.g. a list of child configs).
    pub fn get_trees(&self, key: &str) -> ConfigResult<Vec<ConfigTree>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(map) => Ok(Self { data: map.clone() }),
                    _ => Err(ConfigError::NotAMapping {
                        key: format!("{key}[{i}]"),
                    }),
                })
                .collect(),
            Some(_) => Err(ConfigError::NotAMapping { key: key.to_string() }),
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// Read a value as a list: a scalar becomes a one-element list, a
    /// missing key an empty one.
    pub fn as_array(&self, key: &str) -> Vec<Value> {
        match self.get(key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
        }
    }

    /// Whether a dotted key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set the value at a dotted key, creating intermediate mappings and
    /// replacing intermediate scalars.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let mut parts: Vec<&str> = key.split('.').collect();
        let last = parts.pop().unwrap_or(key);
        let mut current = &mut self.data;
        for part in parts {
            let slot = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => unreachable!("slot was just made a mapping"),
            };
        }
        current.insert(last.to_string(), value.into());
    }

    /// Set a nested tree at a dotted key.
    pub fn set_tree(&mut self, key: &str, tree: ConfigTree) {
        self.set(key, Value::Object(tree.data));
    }

    /// Remove the value at a dotted key, returning it.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let mut parts: Vec<&str> = key.split('.').collect();
        let last = parts.pop()?;
        let mut current = &mut self.data;
        for part in parts {
            current = current.get_mut(part)?.as_object_mut()?;
        }
        current.remove(last)
    }

    /// Deep-merge `other` into this tree; values from `other` win.
    ///
    /// Nested mappings are merged key by key rather than replaced, so
    /// `{a: {b: 1}}` updated with `{a: {c: 2}}` becomes `{a: {b: 1, c: 2}}`.
    pub fn update(&mut self, other: &ConfigTree) {
        deep_update(&mut self.data, &other.data);
    }

    /// Deep-merge `other` into this tree, keeping every value already
    /// present here.
    pub fn merge(&mut self, other: &ConfigTree) {
        let mut base = other.data.clone();
        deep_update(&mut base, &self.data);
        self.data = base;
    }

    /// Every dotted key in the hierarchy, parents before children.
    pub fn names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_names(&self.data, None, &mut names);
        names
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

impl From<Map<String, Value>> for ConfigTree {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

fn deep_update(target: &mut Map<String, Value>, other: &Map<String, Value>) {
    for (key, value) in other {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_update(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn collect_names(map: &Map<String, Value>, base: Option<&str>, out: &mut Vec<String>) {
    for (key, value) in map {
        let name = match base {
            Some(base) => format!("{base}.{key}"),
            None => key.clone(),
        };
        out.push(name.clone());
        if let Value::Object(child) = value {
            collect_names(child, Some(&name), out);
        }
    }
}
