//! Layered configuration for dax.
//!
//! A repository is configured from one tree partitioned into named
//! components (`datastore`, `registry`, ...). Each component owns its
//! defaults; the [`ConfigComposer`] resolves every known component against
//! the caller's overrides and returns a single [`ResolvedConfig`].
//!
//! # Modules
//!
//! - [`tree`]: [`ConfigTree`], a nested mapping with dotted-key access
//! - [`component`]: the [`ConfigComponent`] trait and per-component resolution
//! - [`composer`]: [`ConfigComposer`], [`ConfigSource`] and [`ResolvedConfig`]
//! - [`error`]: Error types for loading and resolving configuration

pub mod component;
pub mod composer;
pub mod error;
pub mod tree;

pub use component::{default_search_paths, resolve_component, ConfigComponent, CONFIG_PATH_ENV};
pub use composer::{ConfigComposer, ConfigSource, ResolvedConfig};
pub use error::{ConfigError, ConfigResult};
pub use tree::{ConfigFormat, ConfigTree, DEFAULT_CONFIG_FILE};
