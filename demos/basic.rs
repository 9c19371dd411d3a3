/// Basic example demonstrating archive creation and reading
///
/// Run with: cargo run --example basic
use anyhow::Result;
use engram_archive::{ArchiveReader, ArchiveWriter, CompressionMethod};
use serde_json::json;

const ARCHIVE: &str = "example_basic.eng";

fn main() -> Result<()> {
    println!("=== engram-archive Basic Example ===\n");

    println!("1. Creating archive...");
    create_archive()?;

    println!("\n2. Reading from archive...");
    read_archive()?;

    std::fs::remove_file(ARCHIVE)?;
    println!("\n✓ Example complete!");
    Ok(())
}

fn create_archive() -> Result<()> {
    let mut writer = ArchiveWriter::create(ARCHIVE)?;

    writer.add_file(
        "readme.txt",
        b"This is a readme file for the basic example.",
    )?;
    writer.add_file(
        "data.json",
        br#"{"name": "Basic Example", "version": "1.0.0"}"#,
    )?;
    writer.add_file("notes.md", "# Notes\n\nThis is a markdown file.\n".repeat(200).as_bytes())?;

    // Compression can also be chosen explicitly
    writer.add_file_with_compression("binary.dat", &[0u8; 1000], CompressionMethod::Lz4)?;

    writer.add_json_manifest(&json!({
        "name": "basic-example",
        "version": "1.0.0",
        "description": "Files written by the basic example",
    }))?;

    writer.finalize()?;
    println!("   ✓ Archive created: {}", ARCHIVE);
    Ok(())
}

fn read_archive() -> Result<()> {
    let mut reader = ArchiveReader::open(ARCHIVE)?;

    println!("   Files in archive:");
    for entry in reader.entries() {
        println!(
            "     - {:<14} {:>6} -> {:>6} bytes ({})",
            entry.path,
            entry.uncompressed_size,
            entry.compressed_size,
            entry.compression()?
        );
    }

    println!("\n   Reading readme.txt:");
    println!("     {}", reader.read_text("readme.txt")?);

    println!("\n   Reading data.json:");
    let json: serde_json::Value = reader.read_json("data.json")?;
    println!("     Name: {}", json["name"]);
    println!("     Version: {}", json["version"]);

    if let Some(manifest) = reader.read_typed_manifest()? {
        println!("\n   Manifest: {} v{} (created {})", manifest.name, manifest.version, manifest.created);
    }

    let failed = reader.verify()?;
    println!("\n   Integrity check: {} failed entries", failed.len());
    Ok(())
}
