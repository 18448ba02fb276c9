//! Building a persisted dictionary from configuration.

use dax_config::ConfigTree;

use crate::error::{DictError, DictResult};
use crate::memory::InMemoryDict;
use crate::schema::PersistedRecord;
use crate::sqlite::DictRegistry;
use crate::traits::{DictKey, PersistedDict};

/// Build the dictionary a configuration node describes.
///
/// - `cls: sqlite` opens the database at `db` and uses `table` in it
/// - `cls: inmemory` builds an [`InMemoryDict`]
/// - without `cls`, `table` is created in `registry`
///
/// Anything else, including a `table` with no registry, fails with
/// [`DictError::InvalidArgument`].
pub fn open_dict<K: DictKey, V: PersistedRecord>(
    config: &ConfigTree,
    key: &str,
    registry: Option<&DictRegistry>,
) -> DictResult<Box<dyn PersistedDict<K, V>>> {
    let table = config.get_str("table");
    match config.get_str("cls") {
        Some("sqlite") => {
            let db = config.get_str("db").ok_or_else(|| {
                DictError::InvalidArgument("sqlite dictionary config needs a db".into())
            })?;
            let table = table.ok_or_else(|| {
                DictError::InvalidArgument("sqlite dictionary config needs a table".into())
            })?;
            tracing::debug!(db, table, "opening configured sqlite dictionary");
            Ok(Box::new(DictRegistry::open(db)?.make_dict::<K, V>(table, key)?))
        }
        Some("inmemory") => Ok(Box::new(InMemoryDict::<K, V>::named(
            table.unwrap_or("memory"),
            key,
        )?)),
        Some(other) => Err(DictError::InvalidArgument(format!(
            "unknown dictionary cls {other:?}"
        ))),
        None => match (table, registry) {
            (Some(table), Some(registry)) => Ok(Box::new(registry.make_dict::<K, V>(table, key)?)),
            (Some(table), None) => Err(DictError::InvalidArgument(format!(
                "dictionary table {table:?} configured without a registry"
            ))),
            (None, _) => Err(DictError::InvalidArgument(
                "dictionary config needs either cls or table".into(),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType, RecordSchema, Row};
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq)]
    struct Counter(i64);

    impl PersistedRecord for Counter {
        fn schema() -> RecordSchema {
            RecordSchema::new(vec![FieldSpec::new("count", FieldType::Integer)])
        }

        fn to_row(&self) -> Row {
            Row::new(vec![self.0.into()])
        }

        fn from_row(row: Row) -> DictResult<Self> {
            Ok(Self(row.integer(0)?))
        }
    }

    fn config(value: serde_json::Value) -> ConfigTree {
        ConfigTree::from_value(value).unwrap()
    }

    #[test]
    fn table_uses_the_registry() {
        let registry = DictRegistry::open_in_memory().unwrap();
        let dict = open_dict::<i64, Counter>(&config(json!({"table": "counters"})), "id", Some(&registry))
            .unwrap();
        dict.set(&1, &Counter(5)).unwrap();
        assert_eq!(registry.tables().unwrap(), vec!["counters".to_string()]);
    }

    #[test]
    fn table_without_registry_is_invalid() {
        let err = open_dict::<i64, Counter>(&config(json!({"table": "counters"})), "id", None)
            .err()
            .unwrap();
        assert!(matches!(err, DictError::InvalidArgument(_)));
    }

    #[test]
    fn neither_cls_nor_table_is_invalid() {
        let registry = DictRegistry::open_in_memory().unwrap();
        let err = open_dict::<i64, Counter>(&config(json!({})), "id", Some(&registry))
            .err()
            .unwrap();
        assert!(matches!(err, DictError::InvalidArgument(_)));
    }

    #[test]
    fn cls_selects_the_implementation() {
        let dict = open_dict::<i64, Counter>(&config(json!({"cls": "inmemory"})), "id", None).unwrap();
        dict.set(&2, &Counter(7)).unwrap();
        assert_eq!(dict.get(&2).unwrap(), Counter(7));

        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("dict.sqlite3");
        let sqlite = config(json!({"cls": "sqlite", "db": db.to_str().unwrap(), "table": "counters"}));
        let dict = open_dict::<i64, Counter>(&sqlite, "id", None).unwrap();
        dict.set(&3, &Counter(9)).unwrap();
        let reopened = open_dict::<i64, Counter>(&sqlite, "id", None).unwrap();
        assert_eq!(reopened.get(&3).unwrap(), Counter(9));
    }

    #[test]
    fn unknown_cls_is_invalid() {
        let err = open_dict::<i64, Counter>(&config(json!({"cls": "redis"})), "id", None)
            .err()
            .unwrap();
        assert!(matches!(err, DictError::InvalidArgument(_)));
    }
}
