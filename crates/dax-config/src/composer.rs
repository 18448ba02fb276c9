//! [`ConfigComposer`]: merges per-component defaults with caller overrides.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::component::{default_search_paths, resolve_component, ConfigComponent};
use crate::error::ConfigResult;
use crate::tree::ConfigTree;

/// A configuration tree with every component's defaults applied.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedConfig(ConfigTree);

impl ResolvedConfig {
    pub fn tree(&self) -> &ConfigTree {
        &self.0
    }

    pub fn into_tree(self) -> ConfigTree {
        self.0
    }
}

impl Deref for ResolvedConfig {
    type Target = ConfigTree;

    fn deref(&self) -> &ConfigTree {
        &self.0
    }
}

/// Where caller overrides come from.
#[derive(Clone, Debug, Default)]
pub enum ConfigSource {
    /// No overrides: every component resolves to its defaults.
    #[default]
    None,
    /// A configuration file, or a directory holding the default file.
    Path(PathBuf),
    /// An in-memory override tree.
    Tree(ConfigTree),
    /// An already-resolved configuration; no defaults are re-applied.
    Resolved(ResolvedConfig),
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<ConfigTree> for ConfigSource {
    fn from(tree: ConfigTree) -> Self {
        Self::Tree(tree)
    }
}

impl From<ResolvedConfig> for ConfigSource {
    fn from(config: ResolvedConfig) -> Self {
        Self::Resolved(config)
    }
}

/// Builds one [`ResolvedConfig`] from a fixed, ordered list of components.
pub struct ConfigComposer {
    components: Vec<Box<dyn ConfigComponent>>,
    search_paths: Vec<PathBuf>,
}

impl ConfigComposer {
    /// Create a composer whose default search paths come from the
    /// environment.
    pub fn new(components: Vec<Box<dyn ConfigComponent>>) -> Self {
        Self {
            components,
            search_paths: default_search_paths(),
        }
    }

    /// Replace the default-file search paths (highest priority first).
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.component())
    }

    /// Resolve `source` into a complete configuration.
    ///
    /// Components are processed in order. A component whose namespace is
    /// present in the overrides merges the overrides over its defaults;
    /// otherwise it resolves to pure defaults. Each claimed namespace is
    /// removed from the overrides before the next component runs, and
    /// whatever is left (keys no component owns) is merged on top at the
    /// end.
    pub fn compose(&self, source: ConfigSource) -> ConfigResult<ResolvedConfig> {
        let mut remaining = match source {
            ConfigSource::Resolved(config) => return Ok(config),
            ConfigSource::None => ConfigTree::new(),
            ConfigSource::Path(path) => ConfigTree::from_file(path)?,
            ConfigSource::Tree(tree) => tree,
        };

        let mut resolved = ConfigTree::new();
        for component in &self.components {
            let name = component.component();
            let present = remaining.contains(name);
            let local = present.then_some(&remaining);
            let subtree = resolve_component(component.as_ref(), local, &self.search_paths)?;
            tracing::debug!(component = name, overridden = present, "resolved config component");
            if present {
                remaining.remove(name);
            }
            resolved.set_tree(name, subtree);
        }

        resolved.update(&remaining);
        Ok(ResolvedConfig(resolved))
    }
}

impl std::fmt::Debug for ConfigComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigComposer")
            .field("components", &self.components().collect::<Vec<_>>())
            .field("search_paths", &self.search_paths)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use serde_json::json;
    use std::fs;

    struct Simple {
        name: &'static str,
        defaults: serde_json::Value,
    }

    impl ConfigComponent for Simple {
        fn component(&self) -> &str {
            self.name
        }

        fn defaults(&self) -> ConfigTree {
            ConfigTree::from_value(self.defaults.clone()).unwrap()
        }
    }

    fn composer() -> ConfigComposer {
        ConfigComposer::new(vec![
            Box::new(Simple {
                name: "datastore",
                defaults: json!({"cls": "inmemory", "records": {"table": "file_records"}}),
            }),
            Box::new(Simple {
                name: "registry",
                defaults: json!({"db": ":memory:"}),
            }),
        ])
        .with_search_paths(Vec::new())
    }

    fn tree(value: serde_json::Value) -> ConfigTree {
        ConfigTree::from_value(value).unwrap()
    }

    #[test]
    fn absent_component_gets_pure_defaults() {
        let resolved = composer()
            .compose(tree(json!({"datastore": {"cls": "posix"}})).into())
            .unwrap();
        assert_eq!(resolved.get("registry"), Some(&json!({"db": ":memory:"})));
    }

    #[test]
    fn user_keys_win_over_defaults() {
        let resolved = composer()
            .compose(tree(json!({"datastore": {"cls": "posix", "root": "/data"}})).into())
            .unwrap();
        assert_eq!(resolved.get_str("datastore.cls"), Some("posix"));
        assert_eq!(resolved.get_str("datastore.root"), Some("/data"));
        assert_eq!(resolved.get_str("datastore.records.table"), Some("file_records"));
    }

    #[test]
    fn unowned_keys_survive() {
        let resolved = composer()
            .compose(tree(json!({"extra": {"note": "kept"}, "registry": {"db": "x.db"}})).into())
            .unwrap();
        assert_eq!(resolved.get_str("extra.note"), Some("kept"));
        assert_eq!(resolved.get_str("registry.db"), Some("x.db"));
    }

    #[test]
    fn no_source_means_all_defaults() {
        let resolved = composer().compose(ConfigSource::None).unwrap();
        assert_eq!(resolved.get_str("datastore.cls"), Some("inmemory"));
        assert_eq!(resolved.get_str("registry.db"), Some(":memory:"));
    }

    #[test]
    fn resolved_input_is_not_reprocessed() {
        let resolved = ResolvedConfig(tree(json!({"datastore": {"cls": "posix"}})));
        let again = composer().compose(resolved.clone().into()).unwrap();
        assert_eq!(again, resolved);
        assert!(!again.contains("registry"));
    }

    #[test]
    fn path_source_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("repository.yaml"), "registry:\n  db: repo.sqlite3\n").unwrap();
        let resolved = composer().compose(dir.path().into()).unwrap();
        assert_eq!(resolved.get_str("registry.db"), Some("repo.sqlite3"));
        assert_eq!(resolved.get_str("datastore.cls"), Some("inmemory"));
    }

    #[test]
    fn malformed_namespace_is_an_error() {
        let err = composer()
            .compose(tree(json!({"registry": "not-a-mapping"})).into())
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotAMapping { .. }));
    }
}
