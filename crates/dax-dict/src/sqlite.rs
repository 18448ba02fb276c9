//! SQLite-backed persisted dictionaries.
//!
//! A [`DictRegistry`] owns one SQLite connection and hands out
//! [`SqliteDict`]s, each backed by one table derived from the record schema:
//! one column per field in declaration order, followed by the key column as
//! primary key. Text fields with a maximum length get a named `CHECK`
//! constraint (`ck_{table}_{field}_len`).

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{
    ffi, params, params_from_iter, Connection, ErrorCode, OpenFlags, OptionalExtension, ToSql,
    Transaction, TransactionBehavior,
};

use crate::error::{DictError, DictResult};
use crate::names::validate_table_name;
use crate::schema::{FieldType, FieldValue, PersistedRecord, RecordSchema, Row};
use crate::traits::{DictKey, PersistedDict};

/// How long a writer waits on a database locked by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Keys fetched per query while iterating.
const KEY_PAGE_SIZE: usize = 256;

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            Self::Float(v) => ToSqlOutput::Owned(Value::Real(*v)),
            Self::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Self::Boolean(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            Self::Bytes(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
            Self::DateTime(v) => {
                ToSqlOutput::Owned(Value::Text(v.to_rfc3339_opts(SecondsFormat::Micros, true)))
            }
        })
    }
}

/// Convert a stored SQLite value back into a field of type `ty`.
fn from_sql(field: &str, ty: FieldType, value: Value) -> DictResult<FieldValue> {
    let mismatch = |actual: String| DictError::TypeMismatch {
        field: field.to_string(),
        expected: ty.to_string(),
        actual,
    };
    match (ty, value) {
        (FieldType::Integer, Value::Integer(v)) => Ok(FieldValue::Integer(v)),
        (FieldType::Float, Value::Real(v)) => Ok(FieldValue::Float(v)),
        // SQLite stores integral REAL values as integers.
        (FieldType::Float, Value::Integer(v)) => Ok(FieldValue::Float(v as f64)),
        (FieldType::Text, Value::Text(v)) => Ok(FieldValue::Text(v)),
        (FieldType::Boolean, Value::Integer(v)) => Ok(FieldValue::Boolean(v != 0)),
        (FieldType::Bytes, Value::Blob(v)) => Ok(FieldValue::Bytes(v)),
        (FieldType::DateTime, Value::Text(v)) => DateTime::parse_from_rfc3339(&v)
            .map(|dt| FieldValue::DateTime(dt.with_timezone(&Utc)))
            .map_err(|e| mismatch(format!("unparseable timestamp {v:?}: {e}"))),
        (_, other) => Err(mismatch(other.data_type().to_string())),
    }
}

/// Owner of one SQLite database and factory for table-backed dictionaries.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct DictRegistry {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl DictRegistry {
    /// Open (creating if needed) the database at `path`. The path
    /// `:memory:` opens a private in-memory database.
    pub fn open(path: impl AsRef<Path>) -> DictResult<Self> {
        let path = path.as_ref();
        if path == Path::new(":memory:") {
            return Self::open_in_memory();
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        tracing::debug!(path = %path.display(), "opened dictionary database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: path.display().to_string(),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> DictResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: ":memory:".into(),
        })
    }

    /// Where the database lives: a file path or `:memory:`.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Build a dictionary over `table`, creating the table if absent.
    ///
    /// `key` names the key column; its type comes from `K`. Fails with
    /// [`DictError::InvalidArgument`] for a non-canonical table name, an
    /// invalid schema, or an existing table with different columns.
    pub fn make_dict<K: DictKey, V: PersistedRecord>(
        &self,
        table: &str,
        key: &str,
    ) -> DictResult<SqliteDict<K, V>> {
        SqliteDict::create(Arc::clone(&self.conn), table, key)
    }

    /// Names of the tables in the database, sorted.
    pub fn tables(&self) -> DictResult<Vec<String>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }
}

impl fmt::Debug for DictRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictRegistry")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Result of one write attempt inside a savepoint.
enum Attempt {
    Written,
    /// The key already exists; the savepoint was rolled back.
    Duplicate,
}

/// A [`PersistedDict`] stored in one SQLite table.
pub struct SqliteDict<K: DictKey, V: PersistedRecord> {
    conn: Arc<Mutex<Connection>>,
    table: String,
    key: String,
    schema: RecordSchema,
    select_sql: String,
    insert_sql: String,
    update_sql: String,
    delete_sql: String,
    count_sql: String,
    keys_first_sql: String,
    keys_after_sql: String,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K: DictKey, V: PersistedRecord> SqliteDict<K, V> {
    fn create(conn: Arc<Mutex<Connection>>, table: &str, key: &str) -> DictResult<Self> {
        validate_table_name(table)?;
        let schema = V::schema();
        schema.validate_for_key(key)?;

        let mut columns: Vec<String> = schema
            .fields()
            .iter()
            .map(|field| {
                let mut column = format!("{} {} NOT NULL", field.name, field.ty.sql_type());
                if let Some(max) = field.max_length {
                    column.push_str(&format!(
                        " CONSTRAINT ck_{table}_{name}_len CHECK (length({name}) <= {max})",
                        name = field.name
                    ));
                }
                column
            })
            .collect();
        columns.push(format!("{key} {} NOT NULL PRIMARY KEY", K::field_type().sql_type()));
        let create_sql = format!("CREATE TABLE IF NOT EXISTS {table} ({})", columns.join(", "));

        let expected: Vec<String> = schema
            .field_names()
            .chain(std::iter::once(key))
            .map(str::to_string)
            .collect();
        {
            let guard = conn.lock().expect("lock poisoned");
            guard.execute_batch(&create_sql)?;
            let mut stmt = guard.prepare(&format!("PRAGMA table_info({table})"))?;
            let existing = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            if existing != expected {
                return Err(DictError::InvalidArgument(format!(
                    "table {table} exists with columns {existing:?}, expected {expected:?}"
                )));
            }
        }
        tracing::info!(table, key, columns = expected.len(), "dictionary table ready");

        let field_list = schema.field_names().collect::<Vec<_>>().join(", ");
        let placeholders = (1..=expected.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let assignments = schema
            .field_names()
            .enumerate()
            .map(|(i, name)| format!("{name} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let key_param = expected.len();

        Ok(Self {
            select_sql: format!("SELECT {field_list} FROM {table} WHERE {key} = ?1"),
            insert_sql: format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders})",
                expected.join(", ")
            ),
            update_sql: format!("UPDATE {table} SET {assignments} WHERE {key} = ?{key_param}"),
            delete_sql: format!("DELETE FROM {table} WHERE {key} = ?1"),
            count_sql: format!("SELECT COUNT(*) FROM {table}"),
            keys_first_sql: format!(
                "SELECT {key} FROM {table} ORDER BY {key} LIMIT {KEY_PAGE_SIZE}"
            ),
            keys_after_sql: format!(
                "SELECT {key} FROM {table} WHERE {key} > ?1 ORDER BY {key} LIMIT {KEY_PAGE_SIZE}"
            ),
            conn,
            table: table.to_string(),
            key: key.to_string(),
            schema,
            _types: PhantomData,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_column(&self) -> &str {
        &self.key
    }

    fn not_found(&self, key: &K) -> DictError {
        DictError::KeyNotFound {
            table: self.table.clone(),
            key: format!("{key:?}"),
        }
    }

    /// Run one statement inside its own savepoint. A key uniqueness
    /// violation rolls the savepoint back and is reported as
    /// [`Attempt::Duplicate`]; any other constraint failure is an invalid
    /// value.
    fn attempt(
        &self,
        tx: &mut Transaction<'_>,
        sql: &str,
        values: &[FieldValue],
    ) -> DictResult<Attempt> {
        let savepoint = tx.savepoint()?;
        match savepoint.execute(sql, params_from_iter(values.iter())) {
            Ok(_) => {
                savepoint.commit()?;
                Ok(Attempt::Written)
            }
            Err(rusqlite::Error::SqliteFailure(err, message))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                match err.extended_code {
                    ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                        Ok(Attempt::Duplicate)
                    }
                    _ => Err(DictError::InvalidValue {
                        table: self.table.clone(),
                        reason: message.unwrap_or_else(|| err.to_string()),
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<K: DictKey, V: PersistedRecord> PersistedDict<K, V> for SqliteDict<K, V> {
    fn get(&self, key: &K) -> DictResult<V> {
        let width = self.schema.len();
        let raw: Option<Vec<Value>> = {
            let conn = self.conn.lock().expect("lock poisoned");
            conn.query_row(&self.select_sql, params![key.to_value()], |row| {
                (0..width).map(|i| row.get::<_, Value>(i)).collect()
            })
            .optional()?
        };
        let raw = raw.ok_or_else(|| self.not_found(key))?;
        let values = self
            .schema
            .fields()
            .iter()
            .zip(raw)
            .map(|(spec, value)| from_sql(&spec.name, spec.ty, value))
            .collect::<DictResult<Vec<_>>>()?;
        V::from_row(Row::new(values))
    }

    /// Insert first; when the key already exists, update it instead.
    ///
    /// Both attempts run in savepoints inside one immediate transaction, so
    /// concurrent writers on other connections are serialized by SQLite:
    /// exactly one insert wins and later writers fall through to update.
    fn set(&self, key: &K, value: &V) -> DictResult<()> {
        let row = value.to_row();
        self.schema.check_types(&row)?;
        let mut values = row.into_values();
        values.push(key.to_value());

        let mut conn = self.conn.lock().expect("lock poisoned");
        let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match self.attempt(&mut tx, &self.insert_sql, &values)? {
            Attempt::Written => {}
            Attempt::Duplicate => {
                tracing::debug!(table = %self.table, key = ?key, "key exists, updating");
                if let Attempt::Duplicate = self.attempt(&mut tx, &self.update_sql, &values)? {
                    return Err(DictError::InvalidValue {
                        table: self.table.clone(),
                        reason: "uniqueness conflict on update".into(),
                    });
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, key: &K) -> DictResult<()> {
        let deleted = {
            let conn = self.conn.lock().expect("lock poisoned");
            conn.execute(&self.delete_sql, params![key.to_value()])?
        };
        if deleted == 0 {
            return Err(self.not_found(key));
        }
        Ok(())
    }

    fn keys(&self) -> DictResult<Box<dyn Iterator<Item = DictResult<K>> + '_>> {
        Ok(Box::new(Keys {
            dict: self,
            after: None,
            page: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn len(&self) -> DictResult<usize> {
        let conn = self.conn.lock().expect("lock poisoned");
        let count: i64 = conn.query_row(&self.count_sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl<K: DictKey, V: PersistedRecord> fmt::Debug for SqliteDict<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDict")
            .field("table", &self.table)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Key iterator reading one page per query, resuming after the last key.
struct Keys<'a, K: DictKey, V: PersistedRecord> {
    dict: &'a SqliteDict<K, V>,
    after: Option<FieldValue>,
    page: VecDeque<K>,
    exhausted: bool,
}

impl<K: DictKey, V: PersistedRecord> Keys<'_, K, V> {
    fn fill(&mut self) -> DictResult<()> {
        let sql = if self.after.is_some() {
            &self.dict.keys_after_sql
        } else {
            &self.dict.keys_first_sql
        };
        let raw = {
            let conn = self.dict.conn.lock().expect("lock poisoned");
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt.query_map(params_from_iter(self.after.iter()), |row| {
                row.get::<_, Value>(0)
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        if raw.len() < KEY_PAGE_SIZE {
            self.exhausted = true;
        }
        for value in raw {
            let key = K::from_value(from_sql(&self.dict.key, K::field_type(), value)?)?;
            self.after = Some(key.to_value());
            self.page.push_back(key);
        }
        Ok(())
    }
}

impl<K: DictKey, V: PersistedRecord> Iterator for Keys<'_, K, V> {
    type Item = DictResult<K>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.page.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.page.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use std::sync::Barrier;
    use std::thread;

    #[derive(Clone, Debug, PartialEq)]
    struct FileRecord {
        path: String,
        size: i64,
        ratio: f64,
        verified: bool,
        digest: Vec<u8>,
        written: DateTime<Utc>,
    }

    impl PersistedRecord for FileRecord {
        fn schema() -> RecordSchema {
            RecordSchema::new(vec![
                FieldSpec::text("path", 16),
                FieldSpec::new("size", FieldType::Integer),
                FieldSpec::new("ratio", FieldType::Float),
                FieldSpec::new("verified", FieldType::Boolean),
                FieldSpec::new("digest", FieldType::Bytes),
                FieldSpec::new("written", FieldType::DateTime),
            ])
        }

        fn to_row(&self) -> Row {
            Row::new(vec![
                self.path.as_str().into(),
                self.size.into(),
                self.ratio.into(),
                self.verified.into(),
                self.digest.clone().into(),
                self.written.into(),
            ])
        }

        fn from_row(row: Row) -> DictResult<Self> {
            Ok(Self {
                path: row.text(0)?.to_string(),
                size: row.integer(1)?,
                ratio: row.float(2)?,
                verified: row.boolean(3)?,
                digest: row.bytes(4)?.to_vec(),
                written: row.datetime(5)?,
            })
        }
    }

    fn record(path: &str, size: i64) -> FileRecord {
        FileRecord {
            path: path.into(),
            size,
            ratio: 0.5,
            verified: true,
            digest: vec![1, 2, 3],
            written: DateTime::from_timestamp(1_700_000_000, 123_000_000).unwrap(),
        }
    }

    fn dict() -> SqliteDict<i64, FileRecord> {
        DictRegistry::open_in_memory()
            .unwrap()
            .make_dict("records", "dataset_id")
            .unwrap()
    }

    #[test]
    fn set_then_get_round_trips() {
        let dict = dict();
        let value = record("a/b.json", 42);
        dict.set(&1, &value).unwrap();
        assert_eq!(dict.get(&1).unwrap(), value);
        assert!(dict.contains(&1).unwrap());
        assert!(!dict.contains(&2).unwrap());
    }

    #[test]
    fn set_existing_key_updates_in_place() {
        let dict = dict();
        dict.set(&1, &record("first", 1)).unwrap();
        dict.set(&1, &record("second", 2)).unwrap();
        assert_eq!(dict.len().unwrap(), 1);
        assert_eq!(dict.get(&1).unwrap().path, "second");
    }

    #[test]
    fn missing_keys_are_reported() {
        let dict = dict();
        assert!(matches!(dict.get(&9), Err(DictError::KeyNotFound { .. })));
        assert!(matches!(dict.delete(&9), Err(DictError::KeyNotFound { .. })));
    }

    #[test]
    fn delete_removes_exactly_one_row() {
        let dict = dict();
        dict.set(&1, &record("a", 1)).unwrap();
        dict.set(&2, &record("b", 2)).unwrap();
        dict.delete(&1).unwrap();
        assert_eq!(dict.len().unwrap(), 1);
        assert!(matches!(dict.get(&1), Err(DictError::KeyNotFound { .. })));
        assert_eq!(dict.get(&2).unwrap().path, "b");
    }

    #[test]
    fn length_constraint_is_an_invalid_value() {
        let dict = dict();
        let err = dict.set(&1, &record("this path is far too long", 1)).unwrap_err();
        assert!(matches!(err, DictError::InvalidValue { .. }), "got {err}");
        assert!(dict.is_empty().unwrap());

        // The same failure on the update path leaves the old row intact.
        dict.set(&1, &record("short", 1)).unwrap();
        let err = dict.set(&1, &record("this path is far too long", 2)).unwrap_err();
        assert!(matches!(err, DictError::InvalidValue { .. }));
        assert_eq!(dict.get(&1).unwrap().path, "short");
    }

    #[test]
    fn length_constraint_is_named_after_table_and_field() {
        let registry = DictRegistry::open_in_memory().unwrap();
        let _dict: SqliteDict<i64, FileRecord> = registry.make_dict("records", "id").unwrap();
        let conn = registry.conn.lock().unwrap();
        let sql: String = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE name = 'records'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(sql.contains("ck_records_path_len"), "{sql}");
        assert!(sql.contains("id INTEGER NOT NULL PRIMARY KEY"), "{sql}");
    }

    #[derive(Clone, Debug)]
    struct Mistyped;

    impl PersistedRecord for Mistyped {
        fn schema() -> RecordSchema {
            RecordSchema::new(vec![FieldSpec::new("count", FieldType::Integer)])
        }

        fn to_row(&self) -> Row {
            Row::new(vec!["not a number".into()])
        }

        fn from_row(_row: Row) -> DictResult<Self> {
            Ok(Self)
        }
    }

    #[test]
    fn malformed_value_is_a_type_mismatch() {
        let registry = DictRegistry::open_in_memory().unwrap();
        let dict: SqliteDict<i64, Mistyped> = registry.make_dict("mistyped", "id").unwrap();
        assert!(matches!(
            dict.set(&1, &Mistyped),
            Err(DictError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn table_names_must_be_canonical() {
        let registry = DictRegistry::open_in_memory().unwrap();
        let err = registry
            .make_dict::<i64, FileRecord>("Records", "id")
            .unwrap_err();
        assert!(matches!(err, DictError::InvalidArgument(_)));
        assert!(registry.tables().unwrap().is_empty());
    }

    #[test]
    fn reconstruction_is_idempotent() {
        let registry = DictRegistry::open_in_memory().unwrap();
        let first: SqliteDict<i64, FileRecord> = registry.make_dict("records", "id").unwrap();
        first.set(&3, &record("kept", 3)).unwrap();
        let second: SqliteDict<i64, FileRecord> = registry.make_dict("records", "id").unwrap();
        assert_eq!(second.get(&3).unwrap().path, "kept");
    }

    #[test]
    fn existing_table_with_other_columns_is_rejected() {
        let registry = DictRegistry::open_in_memory().unwrap();
        let _: SqliteDict<i64, FileRecord> = registry.make_dict("records", "id").unwrap();
        let err = registry
            .make_dict::<i64, FileRecord>("records", "dataset_id")
            .unwrap_err();
        assert!(matches!(err, DictError::InvalidArgument(_)));
    }

    #[test]
    fn keys_page_through_every_row_and_restart() {
        let dict = dict();
        let total = (KEY_PAGE_SIZE * 2 + 7) as i64;
        for k in 0..total {
            dict.set(&k, &record("p", k)).unwrap();
        }
        let keys: Vec<i64> = dict.keys().unwrap().collect::<DictResult<_>>().unwrap();
        assert_eq!(keys, (0..total).collect::<Vec<_>>());
        assert_eq!(dict.keys().unwrap().count(), total as usize);
    }

    #[test]
    fn text_keys() {
        let registry = DictRegistry::open_in_memory().unwrap();
        let dict: SqliteDict<String, FileRecord> = registry.make_dict("by_name", "name").unwrap();
        dict.set(&"b".to_string(), &record("b", 1)).unwrap();
        dict.set(&"a".to_string(), &record("a", 2)).unwrap();
        let keys: Vec<String> = dict.keys().unwrap().collect::<DictResult<_>>().unwrap();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn concurrent_first_writes_leave_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.sqlite3");
        DictRegistry::open(&path)
            .unwrap()
            .make_dict::<i64, FileRecord>("race", "id")
            .unwrap();

        const KEYS: i64 = 25;
        let barrier = Arc::new(Barrier::new(2));
        let writers: Vec<_> = ["left", "right"]
            .into_iter()
            .map(|name| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let registry = DictRegistry::open(&path).unwrap();
                    let dict: SqliteDict<i64, FileRecord> =
                        registry.make_dict("race", "id").unwrap();
                    barrier.wait();
                    for k in 0..KEYS {
                        dict.set(&k, &record(name, k)).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let dict: SqliteDict<i64, FileRecord> =
            DictRegistry::open(&path).unwrap().make_dict("race", "id").unwrap();
        assert_eq!(dict.len().unwrap(), KEYS as usize);
        for k in 0..KEYS {
            let stored = dict.get(&k).unwrap();
            assert!(stored.path == "left" || stored.path == "right");
            assert_eq!(stored.size, k);
        }
    }
}
