//! Image source protocol handlers.
//!
//! Supports `file://` (local root filesystem directory) and `tar://`
//! (plain or gzip-compressed archive). Images are only ever imported from
//! the local machine.

use std::path::PathBuf;

use burrow_common::error::{BurrowError, Result};

/// Supported image source protocols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Local directory (`file:///path/to/rootfs`).
    File(PathBuf),
    /// Local tar archive (`tar:///path/to/image.tar.gz`).
    Tar(PathBuf),
}

impl ImageSource {
    /// Returns the local path behind the source.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::File(p) | Self::Tar(p) => p,
        }
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(p) => write!(f, "file://{}", p.display()),
            Self::Tar(p) => write!(f, "tar://{}", p.display()),
        }
    }
}

/// Resolves an image source URI into an `ImageSource`.
///
/// # Errors
///
/// Returns `Config` if the URI scheme is unsupported, `NotFound` if the
/// path does not exist or has the wrong kind.
pub fn resolve_source(uri: &str) -> Result<ImageSource> {
    if let Some(path_str) = uri.strip_prefix("file://") {
        let path = PathBuf::from(path_str);
        if !path.is_dir() {
            return Err(BurrowError::NotFound {
                kind: "image directory",
                id: path_str.to_string(),
            });
        }
        tracing::info!(path = %path.display(), "resolved file:// source");
        Ok(ImageSource::File(path))
    } else if let Some(path_str) = uri.strip_prefix("tar://") {
        let path = PathBuf::from(path_str);
        if !path.is_file() {
            return Err(BurrowError::NotFound {
                kind: "tar archive",
                id: path_str.to_string(),
            });
        }
        tracing::info!(path = %path.display(), "resolved tar:// source");
        Ok(ImageSource::Tar(path))
    } else {
        Err(BurrowError::Config {
            message: format!("unsupported image source URI scheme: {uri} (expected file:// or tar://)"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_file_source_existing_dir_returns_file() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let uri = format!("file://{}", dir.path().display());
        let source = resolve_source(&uri).expect("resolve failed");
        assert_eq!(source, ImageSource::File(dir.path().to_path_buf()));
        assert_eq!(source.to_string(), uri);
    }

    #[test]
    fn resolve_tar_source_existing_file_returns_tar() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let tar_path = dir.path().join("test.tar");
        std::fs::write(&tar_path, b"fake tar").expect("failed to write");
        let uri = format!("tar://{}", tar_path.display());
        let source = resolve_source(&uri).expect("resolve failed");
        assert!(matches!(source, ImageSource::Tar(_)));
    }

    #[test]
    fn file_scheme_pointing_at_file_is_rejected() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("rootfs.tar");
        std::fs::write(&path, b"x").expect("write");
        assert!(resolve_source(&format!("file://{}", path.display())).is_err());
    }

    #[test]
    fn remote_and_unknown_schemes_are_rejected() {
        assert!(matches!(
            resolve_source("https://example.com/image.tar"),
            Err(BurrowError::Config { .. })
        ));
        assert!(resolve_source("ftp://example.com/image").is_err());
    }

    #[test]
    fn resolve_missing_paths_returns_not_found() {
        assert!(matches!(
            resolve_source("file:///nonexistent/path"),
            Err(BurrowError::NotFound { .. })
        ));
        assert!(matches!(
            resolve_source("tar:///nonexistent/archive.tar"),
            Err(BurrowError::NotFound { .. })
        ));
    }
}
