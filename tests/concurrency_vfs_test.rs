//! Database bridge tests
//!
//! Embedded databases are seeded with rusqlite on disk, packed into an
//! archive, and queried back through the in-memory VFS.

use engram_archive::{json_params, ArchiveReader, ArchiveWriter, EngramError, LockLevel};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::json;
use std::path::Path;
use std::thread;
use tempfile::NamedTempFile;

/// Helper: Create a database with `rows` products and return its bytes
fn create_database(rows: usize) -> Vec<u8> {
    let temp_db = NamedTempFile::new().unwrap();
    {
        let conn = Connection::open(temp_db.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT NOT NULL, price REAL, tags TEXT);
             CREATE INDEX idx_products_name ON products(name);",
        )
        .unwrap();

        let tx = conn.unchecked_transaction().unwrap();
        for i in 0..rows {
            tx.execute(
                "INSERT INTO products (name, price, tags) VALUES (?1, ?2, ?3)",
                params![format!("product-{}", i), i as f64 * 1.5, "[]"],
            )
            .unwrap();
        }
        tx.commit().unwrap();
    }
    std::fs::read(temp_db.path()).unwrap()
}

/// Helper: Pack databases into an archive
fn create_archive(databases: &[(&str, &[u8])]) -> NamedTempFile {
    let temp_file = NamedTempFile::new().unwrap();
    let mut writer = ArchiveWriter::create(temp_file.path()).unwrap();
    for (path, data) in databases {
        writer.add_file(path, data).unwrap();
    }
    writer.finalize().unwrap();
    temp_file
}

fn count(reader_path: &Path, db_path: &str) -> i64 {
    let mut reader = ArchiveReader::open(reader_path).unwrap();
    let db = reader.open_database(db_path).unwrap();
    match db.query_value("SELECT COUNT(*) FROM products", []).unwrap() {
        Some(Value::Integer(n)) => n,
        other => panic!("unexpected count: {:?}", other),
    }
}

#[test]
fn test_database_fidelity() {
    let image = create_database(500);
    let archive = create_archive(&[("catalog.db", &image[..])]);

    // Same answer from the original file and the archived copy
    let original = NamedTempFile::new().unwrap();
    std::fs::write(original.path(), &image).unwrap();
    let expected: i64 = Connection::open(original.path())
        .unwrap()
        .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))
        .unwrap();

    assert_eq!(expected, 500);
    assert_eq!(count(archive.path(), "catalog.db"), expected);

    let mut reader = ArchiveReader::open(archive.path()).unwrap();
    let db = reader.open_database("catalog.db").unwrap();
    assert_eq!(db.name(), "catalog.db");
    assert_eq!(db.size(), image.len() as u64);

    let row = db
        .query_one("SELECT id, name, price FROM products WHERE id = ?1", [10])
        .unwrap()
        .unwrap();
    assert_eq!(row.columns(), &["id".to_string(), "name".to_string(), "price".to_string()]);
    assert_eq!(row.get("name"), Some(&Value::Text("product-9".into())));
    assert_eq!(row.get("price"), Some(&Value::Real(13.5)));
}

#[test]
fn test_index_used_for_lookup() {
    let image = create_database(2000);
    let archive = create_archive(&[("catalog.db", &image[..])]);

    let mut reader = ArchiveReader::open(archive.path()).unwrap();
    let db = reader.open_database("catalog.db").unwrap();

    let rows = db
        .query(
            "SELECT id FROM products WHERE name = ?1",
            params_from_iter(json_params(&[json!("product-1234")])),
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_index(0), Some(&Value::Integer(1235)));
}

#[test]
fn test_writes_never_reach_archive() {
    let image = create_database(10);
    let archive = create_archive(&[("catalog.db", &image[..])]);
    let before = std::fs::read(archive.path()).unwrap();

    {
        let mut reader = ArchiveReader::open(archive.path()).unwrap();
        let db = reader.open_database("catalog.db").unwrap();
        let changed = db.execute("DELETE FROM products WHERE id > 5", []).unwrap();
        assert_eq!(changed, 5);
        db.execute("CREATE TABLE scratch (x)", []).unwrap();
        assert!(db.table_exists("scratch").unwrap());
        assert_eq!(db.lock_level(), LockLevel::Unlocked);
    }

    assert_eq!(std::fs::read(archive.path()).unwrap(), before);
    assert_eq!(count(archive.path(), "catalog.db"), 10);

    let mut reader = ArchiveReader::open(archive.path()).unwrap();
    let db = reader.open_database("catalog.db").unwrap();
    assert!(!db.table_exists("scratch").unwrap());
}

#[test]
fn test_databases_on_threads() {
    let small = create_database(50);
    let large = create_database(1000);
    let archive = create_archive(&[("small.db", &small[..]), ("large.sqlite", &large[..])]);
    let path = archive.path().to_path_buf();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let path = path.clone();
            thread::spawn(move || {
                let (db_path, expected) = if t % 2 == 0 {
                    ("small.db", 50)
                } else {
                    ("large.sqlite", 1000)
                };
                let mut reader = ArchiveReader::open(&path).unwrap();
                let db = reader.open_database(db_path).unwrap();
                // Each handle mutates its private copy without affecting others
                db.execute("DELETE FROM products WHERE id % 2 = 0", []).unwrap();
                let remaining = db
                    .query_value("SELECT COUNT(*) FROM products", [])
                    .unwrap();
                assert_eq!(remaining, Some(Value::Integer((expected + 1) / 2)));
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_database_handle_moves_between_threads() {
    let image = create_database(25);
    let archive = create_archive(&[("catalog.db", &image[..])]);

    let mut reader = ArchiveReader::open(archive.path()).unwrap();
    let db = reader.open_database("catalog.db").unwrap();

    let total = thread::spawn(move || {
        db.query_value("SELECT SUM(id) FROM products", [])
            .unwrap()
    })
    .join()
    .unwrap();
    assert_eq!(total, Some(Value::Integer(325)));
}

#[test]
fn test_sql_errors_pass_through() {
    let image = create_database(3);
    let archive = create_archive(&[("catalog.db", &image[..])]);
    let mut reader = ArchiveReader::open(archive.path()).unwrap();
    let db = reader.open_database("catalog.db").unwrap();

    assert!(matches!(
        db.query("SELECT * FROM no_such_table", []),
        Err(EngramError::Sql(_))
    ));
    assert!(matches!(
        db.query("SELECT * FROM products WHERE id = ?1 AND name = ?2", [1]),
        Err(EngramError::Sql(_))
    ));
}

#[test]
fn test_non_database_entry() {
    let archive = create_archive(&[("notes.db", &b"this is not a sqlite file at all, just text padding it out to more than a hundred bytes so the header check fails properly"[..])]);
    let mut reader = ArchiveReader::open(archive.path()).unwrap();

    assert!(matches!(
        reader.open_database("notes.db"),
        Err(EngramError::Sql(_))
    ));
}

#[test]
fn test_corrupt_database_entry() {
    let image = create_database(100);
    let archive = create_archive(&[("catalog.db", &image[..])]);

    let entry = ArchiveReader::open(archive.path())
        .unwrap()
        .get_metadata("catalog.db")
        .unwrap()
        .clone();
    let mut bytes = std::fs::read(archive.path()).unwrap();
    bytes[(entry.offset + entry.compressed_size / 2) as usize] ^= 0xFF;
    std::fs::write(archive.path(), bytes).unwrap();

    let mut reader = ArchiveReader::open(archive.path()).unwrap();
    assert!(matches!(
        reader.open_database("catalog.db"),
        Err(EngramError::Corrupt { .. })
    ));
}
