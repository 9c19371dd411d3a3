//! Multi-reader tests
//!
//! Independent readers, and handles cloned from one reader, must be able to
//! read the same archive from many threads at once.

use engram_archive::{ArchiveReader, ArchiveWriter};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::NamedTempFile;

/// Helper: Create archive with N files
fn create_archive_with_files(file_count: usize) -> NamedTempFile {
    let temp_file = NamedTempFile::new().unwrap();

    let mut writer = ArchiveWriter::create(temp_file.path()).unwrap();
    for i in 0..file_count {
        let filename = format!("file{}.txt", i);
        let data = format!("data{}", i);
        writer.add_file(&filename, data.as_bytes()).unwrap();
    }
    writer.finalize().unwrap();

    temp_file
}

/// Helper: Create archive with large compressible files
fn create_archive_with_large_files(file_count: usize, file_size: usize) -> NamedTempFile {
    let temp_file = NamedTempFile::new().unwrap();

    let mut writer = ArchiveWriter::create(temp_file.path()).unwrap();
    for i in 0..file_count {
        let filename = format!("large{}.bin", i);
        let data = vec![i as u8; file_size];
        writer.add_file(&filename, &data).unwrap();
    }
    writer.finalize().unwrap();

    temp_file
}

#[test]
fn test_independent_readers_on_threads() {
    let archive = create_archive_with_files(100);
    let path = archive.path().to_path_buf();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let path = path.clone();
            thread::spawn(move || {
                let mut reader = ArchiveReader::open(&path).unwrap();
                for i in (t..100).step_by(8) {
                    let data = reader.read_file(&format!("file{}.txt", i)).unwrap();
                    assert_eq!(data, format!("data{}", i).as_bytes());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_cloned_handles_read_simultaneously() {
    let archive = create_archive_with_large_files(4, 256 * 1024);
    let reader = ArchiveReader::open(archive.path()).unwrap();
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let mut handle = reader.try_clone().unwrap();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for round in 0..5 {
                    let i = (t + round) % 4;
                    let data = handle.read_file(&format!("large{}.bin", i)).unwrap();
                    assert_eq!(data.len(), 256 * 1024);
                    assert!(data.iter().all(|&b| b == i as u8));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_readers_agree_on_listing() {
    let archive = create_archive_with_files(50);
    let path = archive.path().to_path_buf();

    let listings: Vec<Vec<String>> = (0..4)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let reader = ArchiveReader::open(&path).unwrap();
                reader.list_files().into_iter().map(String::from).collect()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    assert_eq!(listings[0].len(), 50);
    for listing in &listings[1..] {
        assert_eq!(listing, &listings[0]);
    }
}

#[test]
fn test_batch_read_matches_single_reads() {
    let archive = create_archive_with_files(20);
    let mut reader = ArchiveReader::open(archive.path()).unwrap();

    let paths: Vec<String> = (0..20).rev().map(|i| format!("file{}.txt", i)).collect();
    let batch = reader.read_files(&paths).unwrap();

    for (path, data) in paths.iter().zip(&batch) {
        assert_eq!(&reader.read_file(path).unwrap(), data);
    }

    let mut with_missing = paths.clone();
    with_missing.insert(3, "missing.txt".to_string());
    assert!(reader.read_files(&with_missing).is_err());
}
