//! The [`ConfigComponent`] trait and per-component default resolution.
//!
//! A component owns one namespace of the repository configuration. Its
//! resolved configuration is built in layers, lowest priority first:
//!
//! 1. built-in [`ConfigComponent::defaults`]
//! 2. the component's default file in each search path directory
//! 3. the caller's values for the namespace
//! 4. defaults contributed by the implementation named in `cls`, filling
//!    only keys still missing

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::tree::ConfigTree;

/// Environment variable holding extra default-config directories. Entries
/// earlier in the list take priority over later ones.
pub const CONFIG_PATH_ENV: &str = "DAX_CONFIG_PATHS";

/// One namespaced configuration component with its own defaults.
pub trait ConfigComponent: Send + Sync {
    /// Namespace key of this component (e.g. `"datastore"`).
    fn component(&self) -> &str;

    /// Built-in defaults for the component's subtree.
    fn defaults(&self) -> ConfigTree {
        ConfigTree::new()
    }

    /// File name looked up in each search path for additional defaults.
    fn default_file(&self) -> Option<&str> {
        None
    }

    /// Keys that must be present after resolution.
    fn required_keys(&self) -> &[&str] {
        &[]
    }

    /// Defaults contributed by the implementation the subtree names in its
    /// `cls` key. Unknown identifiers should fail here so that bad
    /// configuration is caught at composition time.
    fn class_defaults(&self, _cls: &str) -> ConfigResult<Option<ConfigTree>> {
        Ok(None)
    }

    /// Final component-specific validation of the resolved subtree.
    fn validate(&self, _tree: &ConfigTree) -> ConfigResult<()> {
        Ok(())
    }
}

/// Search paths from [`CONFIG_PATH_ENV`], highest priority first.
pub fn default_search_paths() -> Vec<PathBuf> {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(|paths| std::env::split_paths(&paths).collect())
        .unwrap_or_default()
}

/// The subtree a component reads from `tree`: the namespace if present,
/// otherwise the whole tree (which is then assumed to be the subtree).
fn component_subset(component: &str, tree: &ConfigTree) -> ConfigResult<ConfigTree> {
    match tree.get_tree(component)? {
        Some(subset) => Ok(subset),
        None => Ok(tree.clone()),
    }
}

fn file_defaults(component: &dyn ConfigComponent, dir: &Path) -> ConfigResult<Option<ConfigTree>> {
    let Some(file) = component.default_file() else {
        return Ok(None);
    };
    let path = dir.join(file);
    if !path.is_file() {
        return Ok(None);
    }
    let tree = ConfigTree::from_file(&path)?;
    component_subset(component.component(), &tree).map(Some)
}

/// Resolve one component against optional caller overrides.
///
/// `overrides` may be either a whole repository tree containing the
/// component's namespace or the component subtree itself. With `None` the
/// result is the component's pure defaults.
pub fn resolve_component(
    component: &dyn ConfigComponent,
    overrides: Option<&ConfigTree>,
    search_paths: &[PathBuf],
) -> ConfigResult<ConfigTree> {
    let name = component.component();
    let mut resolved = component.defaults();

    for dir in search_paths.iter().rev() {
        if let Some(defaults) = file_defaults(component, dir)? {
            tracing::debug!(component = name, dir = %dir.display(), "applying default file");
            resolved.update(&defaults);
        }
    }

    if let Some(overrides) = overrides {
        resolved.update(&component_subset(name, overrides)?);
    }

    if let Some(cls) = resolved.get_str("cls").map(str::to_owned) {
        if let Some(class_defaults) = component.class_defaults(&cls)? {
            resolved.merge(&class_defaults);
        }
    }

    let missing: Vec<String> = component
        .required_keys()
        .iter()
        .filter(|key| !resolved.contains(key))
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::MissingKeys {
            component: name.to_string(),
            keys: missing,
        });
    }

    component.validate(&resolved)?;
    Ok(resolved)
}
