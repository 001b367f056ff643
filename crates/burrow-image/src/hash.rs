//! SHA-256 content hashing.
//!
//! Archives are hashed byte for byte. Directory trees are hashed over their
//! sorted relative paths, entry kinds, and file contents, so the same tree
//! always yields the same id.

use std::fs::File;
use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::Sha256Hash;
use sha2::{Digest, Sha256};

/// Computes the SHA-256 hash of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file(path: &Path) -> Result<Sha256Hash> {
    tracing::debug!(path = %path.display(), "computing SHA-256 hash");
    let mut file = File::open(path).map_err(|e| BurrowError::io(path, e))?;
    let mut hasher = Sha256::new();
    let _ = std::io::copy(&mut file, &mut hasher).map_err(|e| BurrowError::io(path, e))?;
    finish(hasher)
}

/// Computes a deterministic SHA-256 hash of a directory tree.
///
/// # Errors
///
/// Returns an error if any entry cannot be read.
pub fn hash_tree(root: &Path) -> Result<Sha256Hash> {
    tracing::debug!(path = %root.display(), "hashing directory tree");
    let mut hasher = Sha256::new();
    hash_dir(root, Path::new(""), &mut hasher)?;
    finish(hasher)
}

/// Validates that a file matches the expected SHA-256 hash.
///
/// # Errors
///
/// Returns `BurrowError::HashMismatch` if the hashes do not match.
pub fn validate_hash(path: &Path, expected: &Sha256Hash) -> Result<()> {
    tracing::debug!(path = %path.display(), "validating SHA-256 hash");
    let actual = hash_file(path)?;
    if &actual == expected {
        Ok(())
    } else {
        Err(BurrowError::HashMismatch {
            resource: path.display().to_string(),
            expected: expected.as_hex().to_string(),
            actual: actual.as_hex().to_string(),
        })
    }
}

fn hash_dir(dir: &Path, rel: &Path, hasher: &mut Sha256) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| BurrowError::io(dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| BurrowError::io(dir, e))?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let rel = rel.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| BurrowError::io(&path, e))?;
        hasher.update(rel.as_os_str().as_encoded_bytes());
        if file_type.is_symlink() {
            let target = std::fs::read_link(&path).map_err(|e| BurrowError::io(&path, e))?;
            hasher.update(b"\0l\0");
            hasher.update(target.as_os_str().as_encoded_bytes());
        } else if file_type.is_dir() {
            hasher.update(b"\0d\0");
            hash_dir(&path, &rel, hasher)?;
        } else if file_type.is_file() {
            hasher.update(b"\0f\0");
            let mut file = File::open(&path).map_err(|e| BurrowError::io(&path, e))?;
            let _ = std::io::copy(&mut file, hasher).map_err(|e| BurrowError::io(&path, e))?;
        }
    }
    Ok(())
}

fn finish(hasher: Sha256) -> Result<Sha256Hash> {
    let hex: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    Sha256Hash::from_hex(hex)
}
