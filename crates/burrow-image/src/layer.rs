//! Root filesystem import.
//!
//! An image is a single layer: either an unpacked archive or a copy of a
//! local directory tree. Both produce a content hash and a size.

use std::fs::File;
use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::Sha256Hash;

/// A single imported filesystem layer.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Content-addressed hash of this layer.
    pub hash: Sha256Hash,
    /// Size of the unpacked layer in bytes.
    pub size_bytes: u64,
}

/// Extracts a tar archive to the target directory.
///
/// Supports both plain `.tar` and gzip-compressed `.tar.gz` / `.tgz` archives.
/// Ownership and permissions recorded in the archive are preserved.
///
/// # Errors
///
/// Returns an error if extraction or hash computation fails.
pub fn extract_layer(archive_path: &Path, target: &Path) -> Result<Layer> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting layer"
    );

    std::fs::create_dir_all(target).map_err(|e| BurrowError::io(target, e))?;
    let file = File::open(archive_path).map_err(|e| BurrowError::io(archive_path, e))?;

    if is_gzip_archive(archive_path) {
        unpack(tar::Archive::new(flate2::read::GzDecoder::new(file)), target)?;
    } else {
        unpack(tar::Archive::new(file), target)?;
    }

    let hash = crate::hash::hash_file(archive_path)?;
    let size_bytes = tree_size(target)?;
    tracing::info!(hash = %hash, size = size_bytes, "layer extracted");

    Ok(Layer { hash, size_bytes })
}

/// Copies a directory tree into `target`, keeping symlinks as symlinks and
/// preserving permission bits.
///
/// # Errors
///
/// Returns an error if any entry cannot be read or written.
pub fn copy_layer(source: &Path, target: &Path) -> Result<Layer> {
    tracing::info!(
        source = %source.display(),
        target = %target.display(),
        "copying rootfs tree"
    );
    copy_tree(source, target)?;
    let hash = crate::hash::hash_tree(source)?;
    let size_bytes = tree_size(target)?;
    tracing::info!(hash = %hash, size = size_bytes, "layer copied");
    Ok(Layer { hash, size_bytes })
}

/// Sums the sizes of all regular files under `root`.
///
/// # Errors
///
/// Returns an error if a directory cannot be listed.
pub fn tree_size(root: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in std::fs::read_dir(root).map_err(|e| BurrowError::io(root, e))? {
        let entry = entry.map_err(|e| BurrowError::io(root, e))?;
        let meta = std::fs::symlink_metadata(entry.path())
            .map_err(|e| BurrowError::io(entry.path(), e))?;
        if meta.is_dir() {
            total += tree_size(&entry.path())?;
        } else if meta.is_file() {
            total += meta.len();
        }
    }
    Ok(total)
}

fn unpack<R: std::io::Read>(mut archive: tar::Archive<R>, target: &Path) -> Result<()> {
    archive.set_preserve_permissions(true);
    archive.unpack(target).map_err(|e| BurrowError::io(target, e))
}

fn copy_tree(source: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target).map_err(|e| BurrowError::io(target, e))?;
    let perms = std::fs::metadata(source)
        .map_err(|e| BurrowError::io(source, e))?
        .permissions();
    std::fs::set_permissions(target, perms).map_err(|e| BurrowError::io(target, e))?;

    for entry in std::fs::read_dir(source).map_err(|e| BurrowError::io(source, e))? {
        let entry = entry.map_err(|e| BurrowError::io(source, e))?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| BurrowError::io(&from, e))?;
        if file_type.is_symlink() {
            let link = std::fs::read_link(&from).map_err(|e| BurrowError::io(&from, e))?;
            std::os::unix::fs::symlink(&link, &to).map_err(|e| BurrowError::io(&to, e))?;
        } else if file_type.is_dir() {
            copy_tree(&from, &to)?;
        } else if file_type.is_file() {
            let _ = std::fs::copy(&from, &to).map_err(|e| BurrowError::io(&to, e))?;
        } else {
            tracing::debug!(path = %from.display(), "skipping special file");
        }
    }
    Ok(())
}

/// Determines whether the archive is gzip-compressed based on extension.
fn is_gzip_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz"))
}
