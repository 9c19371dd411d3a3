#![no_main]

use engram_archive::ArchiveReader;
use libfuzzer_sys::fuzz_target;
use std::io::Write;
use tempfile::NamedTempFile;

fuzz_target!(|data: &[u8]| {
    // Skip inputs smaller than header + footer
    if data.len() < 26 {
        return;
    }

    let mut temp_file = match NamedTempFile::new() {
        Ok(f) => f,
        Err(_) => return,
    };

    if temp_file.write_all(data).is_err() || temp_file.flush().is_err() {
        return;
    }

    // Opening must reject malformed input without panicking
    let mut reader = match ArchiveReader::open(temp_file.path()) {
        Ok(r) => r,
        Err(_) => return,
    };

    let files: Vec<String> = reader.list_files().into_iter().map(String::from).collect();
    for file in &files {
        let _ = reader.read_file(file);
    }

    let _ = reader.list_prefix("");
    let _ = reader.read_manifest();
    let _ = reader.contains("");
    let _ = reader.contains("../../../etc/passwd");
    let _ = reader.verify();
});
