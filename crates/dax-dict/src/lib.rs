//! Persisted dictionaries for dax.
//!
//! A persisted dictionary is a mutable mapping from a key to a fixed-shape
//! record. The record type declares its fields through a [`RecordSchema`];
//! the table-backed implementation derives one relational table from that
//! schema, with the key as primary key.
//!
//! # Modules
//!
//! - [`error`]: Error types for dictionary operations
//! - [`schema`]: [`FieldType`], [`FieldValue`], [`RecordSchema`], [`Row`] and
//!   the [`PersistedRecord`] trait
//! - [`traits`]: The [`PersistedDict`] trait and [`DictKey`]
//! - [`names`]: Table and column identifier validation
//! - [`memory`]: In-memory [`InMemoryDict`]
//! - [`sqlite`]: [`DictRegistry`] and the SQLite-backed [`SqliteDict`]
//! - [`config`]: [`open_dict`], building a dictionary from configuration

pub mod config;
pub mod error;
pub mod memory;
pub mod names;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use config::open_dict;
pub use error::{DictError, DictResult};
pub use memory::InMemoryDict;
pub use names::{validate_column_name, validate_table_name};
pub use schema::{FieldSpec, FieldType, FieldValue, PersistedRecord, RecordSchema, Row};
pub use sqlite::{DictRegistry, SqliteDict};
pub use traits::{DefaultKey, DictKey, PersistedDict};
