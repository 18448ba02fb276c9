//! Location resolution for dax.
//!
//! A datastore root is either a local directory (`/data/repo`,
//! `file:///data/repo`) or an object-store prefix (`s3://bucket/repo`). A
//! [`LocationFactory`] built from that root turns URIs and root-relative
//! paths into [`Location`]s, each exposing three views of one address:
//!
//! - [`Location::uri`]: canonical, scheme-qualified URI
//! - [`Location::path`]: physical path including the root
//! - [`Location::path_in_store`]: path relative to the root
//!
//! For every location, `path == join(root, path_in_store)` and resolving
//! `uri` again yields the same `path_in_store`.

pub mod error;
pub mod factory;
pub mod location;

pub use error::{LocationError, LocationResult};
pub use factory::LocationFactory;
pub use location::{join_path, Location, Scheme};
