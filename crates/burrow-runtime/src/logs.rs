//! Container log management.
//!
//! Detached containers write stdout and stderr to
//! `containers/<id>/container.log`.

use std::fs::File;
use std::path::{Path, PathBuf};

use burrow_common::constants::CONTAINER_LOG_NAME;
use burrow_common::error::{BurrowError, Result};

/// Returns the log file path for a container.
#[must_use]
pub fn log_path(containers_dir: &Path, container_id: &str) -> PathBuf {
    containers_dir.join(container_id).join(CONTAINER_LOG_NAME)
}

/// Reads container logs from disk.
///
/// Returns an empty string if the log file does not exist yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_logs(containers_dir: &Path, container_id: &str) -> Result<String> {
    let path = log_path(containers_dir, container_id);
    if !path.exists() {
        return Ok(String::new());
    }
    let bytes = std::fs::read(&path).map_err(|e| BurrowError::io(&path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Opens a log file for appending, creating it and its directory.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be created.
pub fn open_log(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BurrowError::io(parent, e))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BurrowError::io(path, e))
}
