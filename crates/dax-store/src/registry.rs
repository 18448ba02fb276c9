//! Backend construction from configuration.
//!
//! A [`BackendRegistry`] maps each `cls` identifier to a factory, the
//! defaults that implementation contributes, and the keys it requires.
//! [`DatastoreComponent`] exposes the same table to configuration
//! composition so an unknown `cls` fails before any backend is built.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dax_config::{ConfigComponent, ConfigError, ConfigResult, ConfigTree};
use dax_dict::{open_dict, DictRegistry, InMemoryDict};
use dax_location::{LocationFactory, Scheme};
use serde_json::json;

use crate::chained::ChainedBackend;
use crate::error::{StoreError, StoreResult};
use crate::filelike::{BlobIo, FileLikeBackend, FileRecords};
use crate::formatter::FormatterRegistry;
use crate::memory::InMemoryBackend;
use crate::object::{ObjectClient, ObjectStoreIo};
use crate::posix::PosixIo;
use crate::records::{checksum, StoredFileInfo, RECORD_KEY};
use crate::template::{FileTemplates, DEFAULT_TEMPLATE};
use crate::traits::StorageBackend;

/// Builds one backend from its resolved configuration node.
pub type BackendFactory =
    fn(&ConfigTree, &BackendContext, &BackendRegistry) -> StoreResult<Box<dyn StorageBackend>>;

/// Shared resources handed to every factory.
#[derive(Clone, Default)]
pub struct BackendContext {
    /// Relational store for file backend records. Without one, unconfigured
    /// records live in memory.
    pub dict_registry: Option<DictRegistry>,
    /// Client used by `objectstore` backends.
    pub object_client: Option<Arc<dyn ObjectClient>>,
}

impl BackendContext {
    pub fn with_dict_registry(mut self, registry: DictRegistry) -> Self {
        self.dict_registry = Some(registry);
        self
    }

    pub fn with_object_client(mut self, client: Arc<dyn ObjectClient>) -> Self {
        self.object_client = Some(client);
        self
    }
}

impl fmt::Debug for BackendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendContext")
            .field(
                "dict_registry",
                &self.dict_registry.as_ref().map(DictRegistry::location),
            )
            .field("object_client", &self.object_client)
            .finish()
    }
}

#[derive(Clone)]
struct BackendEntry {
    factory: BackendFactory,
    defaults: ConfigTree,
    required: Vec<String>,
}

/// `cls` identifier → backend factory.
#[derive(Clone)]
pub struct BackendRegistry {
    entries: HashMap<String, BackendEntry>,
}

impl BackendRegistry {
    /// A registry with the built-in `inmemory`, `posix`, `objectstore` and
    /// `chained` backends.
    pub fn new() -> Self {
        let file_defaults = json!({
            "templates": {"default": DEFAULT_TEMPLATE},
            "formatters": {"default": "json"},
        });
        let mut posix_defaults = file_defaults.clone();
        posix_defaults["create"] = json!(false);

        let mut registry = Self::empty();
        registry.register("inmemory", build_inmemory, ConfigTree::new(), &[]);
        registry.register("posix", build_posix, tree(posix_defaults), &["root"]);
        registry.register("objectstore", build_object_store, tree(file_defaults), &["root"]);
        registry.register("chained", build_chained, ConfigTree::new(), &["datastores"]);
        registry
    }

    /// A registry with no backends.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Add or replace the backend registered as `cls`.
    pub fn register(
        &mut self,
        cls: &str,
        factory: BackendFactory,
        defaults: ConfigTree,
        required: &[&str],
    ) {
        self.entries.insert(
            cls.to_string(),
            BackendEntry {
                factory,
                defaults,
                required: required.iter().map(|k| k.to_string()).collect(),
            },
        );
    }

    pub fn contains(&self, cls: &str) -> bool {
        self.entries.contains_key(cls)
    }

    /// Registered identifiers, sorted.
    pub fn classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        classes.sort_unstable();
        classes
    }

    /// Defaults contributed by `cls`, or `None` if it is not registered.
    pub fn class_defaults(&self, cls: &str) -> Option<&ConfigTree> {
        self.entries.get(cls).map(|entry| &entry.defaults)
    }

    /// Build the backend `config` describes.
    ///
    /// A missing `cls` is an [`StoreError::InvalidArgument`]; an
    /// unregistered one is [`StoreError::UnknownBackend`]. Class defaults
    /// fill keys the node leaves out.
    pub fn build(
        &self,
        config: &ConfigTree,
        context: &BackendContext,
    ) -> StoreResult<Box<dyn StorageBackend>> {
        let cls = config.get_str("cls").ok_or_else(|| {
            StoreError::InvalidArgument("datastore configuration has no cls".into())
        })?;
        let entry = self
            .entries
            .get(cls)
            .ok_or_else(|| StoreError::UnknownBackend(cls.to_string()))?;

        let mut resolved = config.clone();
        resolved.merge(&entry.defaults);
        check_required(cls, &entry.required, &resolved)?;

        tracing::info!(cls, name = resolved.get_str("name").unwrap_or(cls), "constructing datastore");
        (entry.factory)(&resolved, context, self)
    }

    /// Check a datastore node and, for chains, every child: each `cls` must
    /// be registered and every required key present.
    pub fn validate(&self, config: &ConfigTree) -> ConfigResult<()> {
        let invalid = |reason: String| ConfigError::Invalid {
            component: DATASTORE_COMPONENT.into(),
            reason,
        };
        let cls = config
            .get_str("cls")
            .ok_or_else(|| invalid("datastore entry has no cls".into()))?;
        let entry = self
            .entries
            .get(cls)
            .ok_or_else(|| invalid(format!("unknown datastore cls {cls:?}")))?;
        let mut resolved = config.clone();
        resolved.merge(&entry.defaults);
        check_required(cls, &entry.required, &resolved)?;

        if resolved.contains("datastores") {
            let children = resolved.get_trees("datastores")?;
            if children.is_empty() {
                return Err(invalid(format!("{cls} datastore lists no children")));
            }
            for child in &children {
                self.validate(child)?;
            }
        }
        Ok(())
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("classes", &self.classes())
            .finish()
    }
}

fn tree(value: serde_json::Value) -> ConfigTree {
    ConfigTree::from_value(value).unwrap_or_default()
}

fn check_required(cls: &str, required: &[String], config: &ConfigTree) -> ConfigResult<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|key| !config.contains(key))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(ConfigError::MissingKeys {
        component: format!("{DATASTORE_COMPONENT}.{cls}"),
        keys: missing,
    })
}

fn backend_name<'a>(config: &'a ConfigTree, fallback: &'a str) -> &'a str {
    config.get_str("name").unwrap_or(fallback)
}

fn build_inmemory(
    config: &ConfigTree,
    _context: &BackendContext,
    _registry: &BackendRegistry,
) -> StoreResult<Box<dyn StorageBackend>> {
    Ok(Box::new(InMemoryBackend::from_config(config)?))
}

fn build_posix(
    config: &ConfigTree,
    context: &BackendContext,
    _registry: &BackendRegistry,
) -> StoreResult<Box<dyn StorageBackend>> {
    let locations = file_locations(config, Scheme::File)?;
    let io = PosixIo::new(locations.root(), config.get_bool("create").unwrap_or(false))?;
    file_backend(config, context, Arc::new(io), locations, "posix")
}

fn build_object_store(
    config: &ConfigTree,
    context: &BackendContext,
    _registry: &BackendRegistry,
) -> StoreResult<Box<dyn StorageBackend>> {
    let locations = file_locations(config, Scheme::ObjectStore)?;
    let client = context.object_client.clone().ok_or_else(|| {
        StoreError::InvalidArgument("objectstore datastore needs an object client".into())
    })?;
    let bucket = locations.bucket().unwrap_or_default().to_string();
    let io = ObjectStoreIo::new(client, bucket)?;
    file_backend(config, context, Arc::new(io), locations, "objectstore")
}

fn build_chained(
    config: &ConfigTree,
    context: &BackendContext,
    registry: &BackendRegistry,
) -> StoreResult<Box<dyn StorageBackend>> {
    let name = backend_name(config, "chained");
    let mut children = Vec::new();
    for child in config.get_trees("datastores")? {
        let backend = registry.build(&child, context)?;
        tracing::debug!(chain = name, child = backend.name(), "added chained datastore");
        children.push(backend);
    }
    Ok(Box::new(ChainedBackend::new(name, children)?))
}

fn file_locations(config: &ConfigTree, scheme: Scheme) -> StoreResult<LocationFactory> {
    let root = config
        .get_str("root")
        .ok_or_else(|| StoreError::InvalidArgument("datastore needs a root".into()))?;
    let locations = LocationFactory::new(root)?;
    if locations.scheme() != scheme {
        return Err(StoreError::InvalidArgument(format!(
            "root {root:?} is not a {scheme} location"
        )));
    }
    Ok(locations)
}

fn file_backend(
    config: &ConfigTree,
    context: &BackendContext,
    io: Arc<dyn BlobIo>,
    locations: LocationFactory,
    fallback_name: &str,
) -> StoreResult<Box<dyn StorageBackend>> {
    let name = backend_name(config, fallback_name);
    let records: FileRecords = match (config.get_tree("records")?, &context.dict_registry) {
        (Some(records), registry) => Arc::from(open_dict::<i64, StoredFileInfo>(
            &records,
            RECORD_KEY,
            registry.as_ref(),
        )?),
        (None, Some(registry)) => {
            let table = default_records_table(config, fallback_name, &locations);
            tracing::debug!(backend = name, table, "recording artifacts in the registry");
            Arc::new(registry.make_dict::<i64, StoredFileInfo>(&table, RECORD_KEY)?)
        }
        (None, None) => Arc::new(InMemoryDict::<i64, StoredFileInfo>::named(
            &format!("{name}_records"),
            RECORD_KEY,
        )?),
    };
    let templates = FileTemplates::from_config(config.get_tree("templates")?.as_ref())?;
    let formatters = FormatterRegistry::from_config(config.get_tree("formatters")?.as_ref())?;
    let backend = FileLikeBackend::new(name, io, locations, records)?
        .with_templates(templates)
        .with_formatters(formatters);
    Ok(Box::new(backend))
}

/// Records table for a file backend configured without `records`.
///
/// A configured `name` gives `{name}_records`. Unnamed backends get a
/// suffix derived from the root, so two unnamed backends in one chain keep
/// separate tables and a reopened backend finds its own.
fn default_records_table(config: &ConfigTree, cls: &str, locations: &LocationFactory) -> String {
    let sanitize = |raw: &str| -> String {
        raw.chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect()
    };
    let table = match config.get_str("name") {
        Some(name) => format!("{}_records", sanitize(name)),
        None => {
            let digest = checksum(locations.root_uri().as_bytes());
            format!("{}_records_{}", sanitize(cls), &digest[..8])
        }
    };
    if table.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{table}")
    } else {
        table
    }
}

/// Namespace of the datastore configuration.
pub const DATASTORE_COMPONENT: &str = "datastore";

/// The `datastore` configuration component.
#[derive(Debug, Clone, Default)]
pub struct DatastoreComponent {
    registry: BackendRegistry,
}

impl DatastoreComponent {
    pub fn new(registry: BackendRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }
}

impl ConfigComponent for DatastoreComponent {
    fn component(&self) -> &str {
        DATASTORE_COMPONENT
    }

    fn defaults(&self) -> ConfigTree {
        tree(json!({"cls": "inmemory"}))
    }

    fn default_file(&self) -> Option<&str> {
        Some("datastore.yaml")
    }

    fn required_keys(&self) -> &[&str] {
        &["cls"]
    }

    fn class_defaults(&self, cls: &str) -> ConfigResult<Option<ConfigTree>> {
        match self.registry.class_defaults(cls) {
            Some(defaults) => Ok(Some(defaults.clone())),
            None => Err(ConfigError::Invalid {
                component: DATASTORE_COMPONENT.into(),
                reason: format!("unknown datastore cls {cls:?}; known: {:?}", self.registry.classes()),
            }),
        }
    }

    fn validate(&self, tree: &ConfigTree) -> ConfigResult<()> {
        self.registry.validate(tree)
    }
}
