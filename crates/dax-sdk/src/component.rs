//! The `registry` configuration component.

use dax_config::{ConfigComponent, ConfigError, ConfigResult, ConfigTree};
use serde_json::json;

/// Namespace of the relational-store configuration.
pub const REGISTRY_COMPONENT: &str = "registry";

/// Where the repository keeps its persisted dictionaries.
///
/// `db` is a SQLite database path, or `:memory:` (the default) for a
/// private in-process database.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryComponent;

impl ConfigComponent for RegistryComponent {
    fn component(&self) -> &str {
        REGISTRY_COMPONENT
    }

    fn defaults(&self) -> ConfigTree {
        ConfigTree::from_value(json!({"db": ":memory:"})).unwrap_or_default()
    }

    fn default_file(&self) -> Option<&str> {
        Some("registry.yaml")
    }

    fn required_keys(&self) -> &[&str] {
        &["db"]
    }

    fn validate(&self, tree: &ConfigTree) -> ConfigResult<()> {
        match tree.get_str("db") {
            Some(db) if !db.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::Invalid {
                component: REGISTRY_COMPONENT.into(),
                reason: "db must be a non-empty path or :memory:".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dax_config::resolve_component;

    #[test]
    fn defaults_to_an_in_memory_database() {
        let tree = resolve_component(&RegistryComponent, None, &[]).unwrap();
        assert_eq!(tree.get_str("db"), Some(":memory:"));
    }

    #[test]
    fn blank_db_is_invalid() {
        let overrides = ConfigTree::from_value(json!({"registry": {"db": " "}})).unwrap();
        assert!(matches!(
            resolve_component(&RegistryComponent, Some(&overrides), &[]),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
