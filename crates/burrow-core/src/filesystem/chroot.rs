//! Root filesystem switch via `chroot(2)`.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};

/// Changes the process root to `rootfs` and the working directory to `/`.
///
/// Mounts under `rootfs` must already be in place; they stay visible at
/// the same relative paths afterwards.
///
/// # Errors
///
/// Returns `Chroot` if either `chroot(2)` or `chdir(2)` fails.
pub fn enter_root(rootfs: &Path) -> Result<()> {
    nix::unistd::chroot(rootfs).map_err(|e| BurrowError::Chroot {
        path: rootfs.to_path_buf(),
        message: e.to_string(),
    })?;
    nix::unistd::chdir("/").map_err(|e| BurrowError::Chroot {
        path: rootfs.to_path_buf(),
        message: format!("chdir(/) failed: {e}"),
    })?;
    tracing::info!(rootfs = %rootfs.display(), "entered container root");
    Ok(())
}
