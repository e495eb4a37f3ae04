//! The organization fingerprint.
//!
//! The immutable specification documents under `spec/` define the entity's
//! identity. Each file is hashed individually; the lines `name:hash\n`,
//! sorted lexicographically by name, are concatenated and hashed again to
//! produce the fingerprint recorded in `ORGANIZATION.sha256`.

use entity_types::codec;
use entity_types::error::StorageError;
use std::fs;
use std::path::Path;

/// Computes the fingerprint of a specification directory.
///
/// Only regular files directly under `dir` participate; names are the plain
/// file names, so the fingerprint is independent of where the directory
/// lives.
pub fn fingerprint_spec_dir(dir: &Path) -> Result<String, StorageError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let bytes = fs::read(entry.path())?;
        entries.push((name, codec::digest_hex(&bytes)));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut concat = String::new();
    for (name, hash) in &entries {
        concat.push_str(name);
        concat.push(':');
        concat.push_str(hash);
        concat.push('\n');
    }
    Ok(codec::digest_hex(concat.as_bytes()))
}

/// Reads the recorded fingerprint from `ORGANIZATION.sha256`.
pub fn read_recorded_fingerprint(path: &Path) -> Result<String, StorageError> {
    let text = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotInstantiated(path.display().to_string())
        } else {
            StorageError::Io(e)
        }
    })?;
    Ok(text.trim().to_string())
}

/// Writes the fingerprint file.
pub fn write_recorded_fingerprint(path: &Path, fingerprint: &str) -> Result<(), StorageError> {
    fs::write(path, format!("{fingerprint}\n"))?;
    Ok(())
}
