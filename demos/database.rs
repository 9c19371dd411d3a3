/// Example demonstrating SQL queries against a database stored in an archive
///
/// Run with: cargo run --example database
use anyhow::{Context, Result};
use engram_archive::{json_params, ArchiveReader, ArchiveWriter};
use rusqlite::{params_from_iter, Connection};
use serde_json::json;
use tempfile::NamedTempFile;

const ARCHIVE: &str = "example_database.eng";

fn main() -> Result<()> {
    println!("=== engram-archive Database Example ===\n");

    println!("1. Creating sample SQLite database...");
    let db_file = create_sample_database()?;

    println!("\n2. Creating archive with database...");
    let mut writer = ArchiveWriter::create(ARCHIVE)?;
    writer.add_file_from_disk("data/users.db", db_file.path())?;
    writer.finalize()?;
    println!("   ✓ Archive created: {}", ARCHIVE);

    println!("\n3. Querying embedded database...");
    query_embedded_database()?;

    std::fs::remove_file(ARCHIVE)?;
    println!("\n✓ Example complete!");
    Ok(())
}

fn create_sample_database() -> Result<NamedTempFile> {
    let db_file = NamedTempFile::new()?;
    let conn = Connection::open(db_file.path())?;

    conn.execute(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            active BOOLEAN NOT NULL
        )",
        [],
    )?;

    for (name, email, active) in [
        ("Alice", "alice@example.com", true),
        ("Bob", "bob@example.com", true),
        ("Charlie", "charlie@example.com", false),
    ] {
        conn.execute(
            "INSERT INTO users (name, email, active) VALUES (?1, ?2, ?3)",
            (name, email, active),
        )?;
    }

    println!("   ✓ Database created with 3 users");
    Ok(db_file)
}

fn query_embedded_database() -> Result<()> {
    let mut reader = ArchiveReader::open(ARCHIVE)?;
    println!("   Databases in archive: {:?}", reader.list_databases());

    let db = reader
        .open_database("data/users.db")
        .context("opening embedded database")?;
    println!("   ✓ Opened {} ({} bytes in memory)", db.name(), db.size());

    // Parameters arrive as JSON, as they would from a request body
    let params = json_params(&[json!(true)]);
    let rows = db.query(
        "SELECT id, name, email FROM users WHERE active = ?1 ORDER BY id",
        params_from_iter(params),
    )?;

    println!("\n   Active users:");
    for row in &rows {
        println!("     {}", serde_json::to_string(row)?);
    }

    let total = db.query_value("SELECT COUNT(*) FROM users", [])?;
    println!("\n   Total users: {:?}", total);

    // Writes land in the in-memory copy only
    db.execute("DELETE FROM users WHERE active = 0", [])?;
    println!("   Users after private delete: {:?}", db.query_value("SELECT COUNT(*) FROM users", [])?);

    let fresh = reader.open_database("data/users.db")?;
    println!(
        "   Users in a fresh handle: {:?}",
        fresh.query_value("SELECT COUNT(*) FROM users", [])?
    );
    Ok(())
}
