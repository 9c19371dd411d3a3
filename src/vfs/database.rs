use super::sqlite::{SharedStore, VfsRegistration};
use super::store::{BackingStore, LockLevel};
use crate::error::Result;
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, Params, Statement};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;
use tracing::{debug, info};

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
const WAL_VERSION: u8 = 2;
const ROLLBACK_VERSION: u8 = 1;

/// Filename handed to SQLite; the VFS serves one image whatever the name, and
/// archive paths such as `:memory:` would otherwise bypass it
const MAIN_DB_FILENAME: &str = "main.db";

/// SQLite database opened from an in-memory image
///
/// The image is private to this handle: writes succeed but never reach the
/// archive or any other handle.
pub struct Database {
    // Declared before the registration so the connection closes first
    conn: Connection,
    store: SharedStore,
    name: String,
    _vfs: VfsRegistration,
}

impl Database {
    /// Open a database image under `name`
    pub fn from_bytes(name: &str, image: Vec<u8>) -> Result<Self> {
        let image = prepare_image(name, image);
        let store: SharedStore = Arc::new(Mutex::new(BackingStore::memory(image)));
        let vfs = VfsRegistration::register(Arc::clone(&store))?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags_and_vfs(MAIN_DB_FILENAME, flags, vfs.name())?;
        // Journals stay in memory instead of going through the VFS
        conn.execute_batch("PRAGMA journal_mode = MEMORY; PRAGMA temp_store = MEMORY;")?;
        // Reading the schema makes a non-database image fail here
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;

        info!(
            "Opened database {} via {} ({} bytes)",
            name,
            vfs.name(),
            store.lock().file_size()
        );

        Ok(Self {
            conn,
            store,
            name: name.to_string(),
            _vfs: vfs,
        })
    }

    /// Archive path the image came from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying rusqlite connection for anything not wrapped here
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run a query and collect every row
    pub fn query<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        collect_rows(&mut stmt, params, None)
    }

    /// Run a query and return the first row, if any
    pub fn query_one<P: Params>(&self, sql: &str, params: P) -> Result<Option<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        Ok(collect_rows(&mut stmt, params, Some(1))?.into_iter().next())
    }

    /// First column of the first row, if any
    pub fn query_value<P: Params>(&self, sql: &str, params: P) -> Result<Option<Value>> {
        Ok(self
            .query_one(sql, params)?
            .and_then(|row| row.into_values().into_iter().next()))
    }

    /// Execute a statement and return the number of changed rows
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let found = self.query_value(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
        )?;
        Ok(found.is_some())
    }

    /// Current size of the private image in bytes
    pub fn size(&self) -> u64 {
        self.store.lock().file_size()
    }

    /// Lock level SQLite currently holds on the main database file
    pub fn lock_level(&self) -> LockLevel {
        self.store.lock().lock_level()
    }

    /// Copy of the private image, including any writes made so far
    pub fn snapshot(&self) -> Vec<u8> {
        self.store.lock().snapshot()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("size", &self.size())
            .finish()
    }
}

fn collect_rows<P: Params>(stmt: &mut Statement<'_>, params: P, limit: Option<usize>) -> Result<Vec<Row>> {
    let columns: Arc<[String]> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        let values = (0..columns.len())
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        out.push(Row {
            columns: Arc::clone(&columns),
            values,
        });
        if limit.map_or(false, |limit| out.len() >= limit) {
            break;
        }
    }

    Ok(out)
}

/// Rewrite a WAL-mode header to rollback mode in the private copy
///
/// The VFS has no shared-memory support, so WAL images must be read as
/// ordinary rollback databases.
fn prepare_image(name: &str, mut image: Vec<u8>) -> Vec<u8> {
    let is_wal = image.len() >= 100
        && image[..16] == SQLITE_HEADER[..]
        && (image[18] == WAL_VERSION || image[19] == WAL_VERSION);

    if is_wal {
        debug!("Switching {} from WAL to rollback journal", name);
        image[18] = ROLLBACK_VERSION;
        image[19] = ROLLBACK_VERSION;
    }
    image
}

/// One result row with values in column order
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Look up a value by column name
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column/value pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }
}

/// Serializes as an object keyed by column name, preserving column order
impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, &SqlValue(value))?;
        }
        map.end()
    }
}

struct SqlValue<'a>(&'a Value);

impl Serialize for SqlValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_bytes(b),
        }
    }
}

/// Convert JSON query parameters into SQLite values
///
/// Booleans bind as 0/1; arrays and objects bind as their JSON text.
pub fn json_params(params: &[serde_json::Value]) -> Vec<Value> {
    params
        .iter()
        .map(|param| match param {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Integer(i64::from(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngramError;
    use rusqlite::params_from_iter;
    use serde_json::json;

    fn sample_image() -> Vec<u8> {
        let temp_db = tempfile::NamedTempFile::new().unwrap();
        {
            let conn = Connection::open(temp_db.path()).unwrap();
            conn.execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL);
                 INSERT INTO users (name, score) VALUES ('Alice', 9.5);
                 INSERT INTO users (name, score) VALUES ('Bob', 7.0);",
            )
            .unwrap();
        }
        std::fs::read(temp_db.path()).unwrap()
    }

    #[test]
    fn test_query_rows_in_column_order() {
        let db = Database::from_bytes("users.db", sample_image()).unwrap();
        let rows = db
            .query("SELECT name, id FROM users ORDER BY id", [])
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].columns(), &["name".to_string(), "id".to_string()]);
        assert_eq!(rows[0].get("name"), Some(&Value::Text("Alice".into())));
        assert_eq!(rows[1].get_index(1), Some(&Value::Integer(2)));
        assert_eq!(
            serde_json::to_string(&rows[0]).unwrap(),
            r#"{"name":"Alice","id":1}"#
        );
    }

    #[test]
    fn test_reserved_names_still_use_image() {
        for name in [":memory:", "file::memory:"] {
            let db = Database::from_bytes(name, sample_image()).unwrap();
            assert_eq!(db.name(), name);
            assert!(db.table_exists("users").unwrap());
        }
    }

    #[test]
    fn test_query_value_and_table_exists() {
        let db = Database::from_bytes("users.db", sample_image()).unwrap();

        assert_eq!(
            db.query_value("SELECT COUNT(*) FROM users", []).unwrap(),
            Some(Value::Integer(2))
        );
        assert_eq!(
            db.query_value("SELECT name FROM users WHERE id = 99", []).unwrap(),
            None
        );
        assert!(db.table_exists("users").unwrap());
        assert!(!db.table_exists("orders").unwrap());
    }

    #[test]
    fn test_writes_stay_private() {
        let image = sample_image();
        let db = Database::from_bytes("users.db", image.clone()).unwrap();

        db.execute("INSERT INTO users (name, score) VALUES (?1, ?2)", ("Carol", 3.0))
            .unwrap();
        assert_eq!(
            db.query_value("SELECT COUNT(*) FROM users", []).unwrap(),
            Some(Value::Integer(3))
        );

        // A second handle on the same image sees none of it
        let other = Database::from_bytes("users.db", image).unwrap();
        assert_eq!(
            other.query_value("SELECT COUNT(*) FROM users", []).unwrap(),
            Some(Value::Integer(2))
        );
    }

    #[test]
    fn test_locks_released_after_statements() {
        let db = Database::from_bytes("users.db", sample_image()).unwrap();
        db.query("SELECT * FROM users", []).unwrap();
        assert_eq!(db.lock_level(), LockLevel::Unlocked);

        db.execute("DELETE FROM users WHERE id = 1", []).unwrap();
        assert_eq!(db.lock_level(), LockLevel::Unlocked);
    }

    #[test]
    fn test_json_params() {
        let db = Database::from_bytes("users.db", sample_image()).unwrap();
        let params = json_params(&[json!("Bob"), json!(true)]);
        assert_eq!(params[1], Value::Integer(1));

        let rows = db
            .query(
                "SELECT id FROM users WHERE name = ?1 AND ?2 = 1",
                params_from_iter(params),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);

        let converted = json_params(&[json!(null), json!(1.5), json!([1, 2]), json!({"a": 1})]);
        assert_eq!(converted[0], Value::Null);
        assert_eq!(converted[1], Value::Real(1.5));
        assert_eq!(converted[2], Value::Text("[1,2]".into()));
        assert_eq!(converted[3], Value::Text(r#"{"a":1}"#.into()));
    }

    #[test]
    fn test_parameter_mismatch_is_sql_error() {
        let db = Database::from_bytes("users.db", sample_image()).unwrap();
        let result = db.query("SELECT * FROM users WHERE id = ?1", [1, 2]);
        assert!(matches!(result, Err(EngramError::Sql(_))));
    }

    #[test]
    fn test_wal_header_rewritten() {
        let mut image = sample_image();
        image[18] = WAL_VERSION;
        image[19] = WAL_VERSION;

        let db = Database::from_bytes("wal.db", image).unwrap();
        assert_eq!(
            db.query_value("SELECT COUNT(*) FROM users", []).unwrap(),
            Some(Value::Integer(2))
        );
        let snapshot = db.snapshot();
        assert_eq!(snapshot[18], ROLLBACK_VERSION);
        assert_eq!(snapshot[19], ROLLBACK_VERSION);
    }

    #[test]
    fn test_empty_image_is_empty_database() {
        let db = Database::from_bytes("empty.db", Vec::new()).unwrap();
        assert!(!db.table_exists("anything").unwrap());

        db.execute("CREATE TABLE t (x INTEGER)", []).unwrap();
        assert!(db.table_exists("t").unwrap());
        assert!(db.size() > 0);
    }
}
