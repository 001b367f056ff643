//! Mount utilities for container filesystem setup.
//!
//! Handles mounting `/proc`, `/sys`, `/dev`, `/dev/pts`, the `/dev/null`
//! device node, and volume bind mounts under a root filesystem that has
//! not been entered yet.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::VolumeMapping;
use nix::mount::{MsFlags, mount};

/// Directories created under the rootfs before anything is mounted.
pub const MOUNT_POINTS: [&str; 5] = ["proc", "sys", "dev", "dev/pts", "tmp"];

/// A pseudo-filesystem mounted into every container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoMount {
    /// Mount source label.
    pub source: &'static str,
    /// Target path relative to the rootfs.
    pub target: &'static str,
    /// Filesystem type.
    pub fstype: &'static str,
    /// Filesystem-specific options.
    pub data: Option<&'static str>,
}

/// Pseudo-filesystems in mount order. `/dev/pts` must follow `/dev`.
pub const PSEUDO_MOUNTS: [PseudoMount; 4] = [
    PseudoMount {
        source: "proc",
        target: "proc",
        fstype: "proc",
        data: None,
    },
    PseudoMount {
        source: "sysfs",
        target: "sys",
        fstype: "sysfs",
        data: None,
    },
    PseudoMount {
        source: "tmpfs",
        target: "dev",
        fstype: "tmpfs",
        data: None,
    },
    PseudoMount {
        source: "devpts",
        target: "dev/pts",
        fstype: "devpts",
        data: Some("newinstance,ptmxmode=0666,mode=0620"),
    },
];

/// Performs every mount a container needs, in order, under `rootfs`.
///
/// # Errors
///
/// Returns `Mount` on the first failed step.
pub fn setup_container_mounts(rootfs: &Path, volumes: &[VolumeMapping]) -> Result<()> {
    make_mounts_private()?;
    create_mount_points(rootfs)?;
    mount_pseudo_filesystems(rootfs)?;
    create_null_device(rootfs)?;
    for volume in volumes {
        bind_mount(&volume.host_path, &container_path(rootfs, &volume.container_path))?;
    }
    Ok(())
}

/// Stops mount events in this namespace from propagating to the host.
///
/// # Errors
///
/// Returns `Mount` if remounting `/` as recursively private fails.
pub fn make_mounts_private() -> Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| BurrowError::Mount {
        target: PathBuf::from("/"),
        message: format!("making mounts private failed: {e}"),
    })
}

/// Creates the conventional mount point directories under `rootfs`.
///
/// # Errors
///
/// Returns `Mount` if a directory cannot be created.
pub fn create_mount_points(rootfs: &Path) -> Result<()> {
    for dir in MOUNT_POINTS {
        ensure_dir(&rootfs.join(dir))?;
    }
    Ok(())
}

/// Mounts every entry of [`PSEUDO_MOUNTS`] under `rootfs`.
///
/// # Errors
///
/// Returns `Mount` if any `mount(2)` call fails.
pub fn mount_pseudo_filesystems(rootfs: &Path) -> Result<()> {
    for entry in &PSEUDO_MOUNTS {
        let target = rootfs.join(entry.target);
        // A fresh tmpfs on /dev hides the dev/pts directory created earlier.
        ensure_dir(&target)?;
        mount(
            Some(entry.source),
            &target,
            Some(entry.fstype),
            MsFlags::empty(),
            entry.data,
        )
        .map_err(|e| BurrowError::Mount {
            target: target.clone(),
            message: e.to_string(),
        })?;
        tracing::debug!(target = %target.display(), fstype = entry.fstype, "mounted");
    }
    Ok(())
}

/// Creates the `/dev/null` character device (1:3) under `rootfs`.
///
/// An existing node is accepted as is.
///
/// # Errors
///
/// Returns `Mount` if `mknod(2)` fails for any reason other than `EEXIST`.
pub fn create_null_device(rootfs: &Path) -> Result<()> {
    use nix::sys::stat::{Mode, SFlag, makedev, mknod};
    use std::os::unix::fs::PermissionsExt;

    let path = rootfs.join("dev/null");
    match mknod(
        &path,
        SFlag::S_IFCHR,
        Mode::from_bits_truncate(0o666),
        makedev(1, 3),
    ) {
        Ok(()) | Err(nix::errno::Errno::EEXIST) => {}
        Err(e) => {
            return Err(BurrowError::Mount {
                target: path,
                message: format!("mknod failed: {e}"),
            });
        }
    }
    // mknod is subject to the umask.
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o666)).map_err(|e| {
        BurrowError::Mount {
            target: path.clone(),
            message: e.to_string(),
        }
    })
}

/// Bind-mounts `source` onto `target`, creating the target if needed.
///
/// # Errors
///
/// Returns `Mount` if the source is missing or `mount(2)` fails.
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    let meta = std::fs::metadata(source).map_err(|e| BurrowError::Mount {
        target: target.to_path_buf(),
        message: format!("bind source {}: {e}", source.display()),
    })?;
    if meta.is_dir() {
        ensure_dir(target)?;
    } else if !target.exists() {
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        let _ = std::fs::File::create(target).map_err(|e| BurrowError::Mount {
            target: target.to_path_buf(),
            message: e.to_string(),
        })?;
    }
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| BurrowError::Mount {
        target: target.to_path_buf(),
        message: format!("bind mount of {} failed: {e}", source.display()),
    })?;
    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        "bind mount created"
    );
    Ok(())
}

/// Maps an absolute in-container path to its location under `rootfs`.
#[must_use]
pub fn container_path(rootfs: &Path, path: &Path) -> PathBuf {
    rootfs.join(path.strip_prefix("/").unwrap_or(path))
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| BurrowError::Mount {
        target: path.to_path_buf(),
        message: format!("creating mount point failed: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_points_are_created_under_rootfs() {
        let dir = tempfile::tempdir().expect("tempdir");
        create_mount_points(dir.path()).expect("create");
        for point in MOUNT_POINTS {
            assert!(dir.path().join(point).is_dir(), "{point} missing");
        }
    }

    #[test]
    fn create_mount_points_is_repeatable() {
        let dir = tempfile::tempdir().expect("tempdir");
        create_mount_points(dir.path()).expect("first");
        create_mount_points(dir.path()).expect("second");
    }

    #[test]
    fn devpts_follows_dev_and_uses_new_instance() {
        let dev = PSEUDO_MOUNTS.iter().position(|m| m.target == "dev");
        let pts = PSEUDO_MOUNTS.iter().position(|m| m.target == "dev/pts");
        assert!(dev < pts);
        let devpts = &PSEUDO_MOUNTS[pts.expect("devpts entry")];
        assert_eq!(devpts.data, Some("newinstance,ptmxmode=0666,mode=0620"));
    }

    #[test]
    fn container_path_strips_leading_slash() {
        let p = container_path(Path::new("/rootfs"), Path::new("/var/data"));
        assert_eq!(p, PathBuf::from("/rootfs/var/data"));
    }

    #[test]
    fn bind_mount_with_missing_source_fails_before_mounting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = bind_mount(&dir.path().join("absent"), &dir.path().join("target"))
            .expect_err("must fail");
        assert!(matches!(err, BurrowError::Mount { .. }));
        assert!(!dir.path().join("target").exists());
    }
}
