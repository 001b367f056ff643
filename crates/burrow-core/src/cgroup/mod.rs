//! Control-group resource management.
//!
//! Applies memory, CPU affinity, and CPU weight limits to a single process.
//! Every group is named `burrow-<pid>` so groups of different containers
//! never share a directory. Both the legacy per-controller hierarchy (v1)
//! and the unified hierarchy (v2) are supported; the version is detected
//! from the cgroup mount point.

pub mod cpu;
pub mod cpuset;
pub mod memory;

use std::path::{Path, PathBuf};

use burrow_common::constants::CGROUP_PREFIX;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::ResourceSpec;

/// Layout of the cgroup filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    /// One hierarchy per controller (`memory/`, `cpu/`, `cpuset/`), membership via `tasks`.
    V1,
    /// Single unified hierarchy, membership via `cgroup.procs`.
    V2,
}

impl CgroupVersion {
    /// Detects the hierarchy mounted at `root`.
    #[must_use]
    pub fn detect(root: &Path) -> Self {
        if root.join("cgroup.controllers").exists() {
            Self::V2
        } else {
            Self::V1
        }
    }

    /// Control file that registers member processes.
    #[must_use]
    pub const fn membership_file(self) -> &'static str {
        match self {
            Self::V1 => "tasks",
            Self::V2 => "cgroup.procs",
        }
    }
}

/// Resource limiter backed by a cgroup filesystem.
#[derive(Debug, Clone)]
pub struct CgroupLimiter {
    root: PathBuf,
    version: CgroupVersion,
}

impl CgroupLimiter {
    /// Creates a limiter for the hierarchy at `root`, detecting its version.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let version = CgroupVersion::detect(&root);
        tracing::debug!(root = %root.display(), ?version, "cgroup hierarchy detected");
        Self { root, version }
    }

    /// Creates a limiter with an explicit hierarchy version.
    #[must_use]
    pub fn with_version(root: impl Into<PathBuf>, version: CgroupVersion) -> Self {
        Self {
            root: root.into(),
            version,
        }
    }

    /// Returns the hierarchy version in use.
    #[must_use]
    pub const fn version(&self) -> CgroupVersion {
        self.version
    }

    /// Name of the group owned by `pid`.
    #[must_use]
    pub fn group_name(pid: u32) -> String {
        format!("{CGROUP_PREFIX}{pid}")
    }

    /// Directory of the group owned by `pid` for the given v1 controller.
    ///
    /// On v2 the controller is ignored because all controllers share one group.
    #[must_use]
    pub fn group_path(&self, controller: &str, pid: u32) -> PathBuf {
        match self.version {
            CgroupVersion::V1 => self.root.join(controller).join(Self::group_name(pid)),
            CgroupVersion::V2 => self.root.join(Self::group_name(pid)),
        }
    }

    /// Applies every dimension present in `spec` to `pid`.
    ///
    /// Dimensions are independent: a failure in one does not undo another
    /// and does not prevent the remaining ones from being attempted. The
    /// first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMemorySpec` for an unparsable memory size and
    /// `ResourceLimit` for any control-file failure.
    pub fn apply(&self, pid: u32, spec: &ResourceSpec) -> Result<()> {
        if spec.is_empty() {
            return Ok(());
        }
        tracing::info!(pid, ?spec, version = ?self.version, "applying resource limits");

        if self.version == CgroupVersion::V2 {
            self.enable_v2_controllers();
        }

        let mut first_error = None;
        let mut record = |dimension: &str, result: Result<()>| {
            if let Err(e) = result {
                tracing::warn!(pid, dimension, error = %e, "resource limit not applied");
                if first_error.is_none() {
                    first_error = Some(into_limit_error(dimension, e));
                }
            }
        };

        if let Some(memory) = spec.memory.as_deref().filter(|m| !m.is_empty()) {
            record("memory", memory::apply(self, pid, memory));
        }
        if let Some(cpus) = spec.cpuset.as_deref().filter(|c| !c.is_empty()) {
            record("cpuset", cpuset::apply(self, pid, cpus));
        }
        if let Some(shares) = spec.cpu_shares.filter(|s| *s > 0) {
            record("cpu", cpu::apply(self, pid, shares));
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Removes every group that may have been created for `pid`.
    ///
    /// Missing groups are not an error. Every group is attempted even if
    /// an earlier one cannot be removed.
    ///
    /// # Errors
    ///
    /// Returns the first `rmdir` failure other than "not found".
    pub fn remove(&self, pid: u32) -> Result<()> {
        let mut dirs = vec![self.group_path(memory::CONTROLLER, pid)];
        if self.version == CgroupVersion::V1 {
            dirs.push(self.group_path(cpuset::CONTROLLER, pid));
            dirs.push(self.group_path(cpu::CONTROLLER, pid));
        }
        let mut first_error = None;
        for dir in dirs {
            match std::fs::remove_dir(&dir) {
                Ok(()) => tracing::debug!(path = %dir.display(), "cgroup removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %dir.display(), error = %e, "cgroup not removed");
                    if first_error.is_none() {
                        first_error = Some(BurrowError::io(dir, e));
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Creates the group directory, writes `(file, value)` pairs, then adds `pid`.
    pub(crate) fn configure_group(
        &self,
        controller: &str,
        pid: u32,
        settings: &[(&str, String)],
    ) -> Result<PathBuf> {
        let dir = self.group_path(controller, pid);
        std::fs::create_dir_all(&dir).map_err(|e| BurrowError::io(&dir, e))?;
        for (file, value) in settings {
            write_control(&dir, file, value)?;
        }
        write_control(&dir, self.version.membership_file(), &pid.to_string())?;
        tracing::debug!(path = %dir.display(), pid, "process added to cgroup");
        Ok(dir)
    }

    /// Delegates the needed controllers to child groups of the v2 root.
    fn enable_v2_controllers(&self) {
        let file = self.root.join("cgroup.subtree_control");
        if let Err(e) = std::fs::write(&file, "+memory +cpu +cpuset") {
            tracing::debug!(path = %file.display(), error = %e, "controller delegation skipped");
        }
    }
}

/// Writes a single control file inside a group directory.
fn write_control(dir: &Path, file: &str, value: &str) -> Result<()> {
    let path = dir.join(file);
    std::fs::write(&path, value).map_err(|e| BurrowError::io(path, e))
}

fn into_limit_error(dimension: &str, error: BurrowError) -> BurrowError {
    match error {
        e @ (BurrowError::InvalidMemorySpec { .. } | BurrowError::ResourceLimit { .. }) => e,
        other => BurrowError::ResourceLimit {
            message: format!("{dimension}: {other}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: PathBuf) -> String {
        std::fs::read_to_string(path).expect("control file")
    }

    #[test]
    fn detect_v2_when_controllers_file_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(CgroupVersion::detect(dir.path()), CgroupVersion::V1);
        std::fs::write(dir.path().join("cgroup.controllers"), "cpu memory").expect("write");
        assert_eq!(CgroupVersion::detect(dir.path()), CgroupVersion::V2);
    }

    #[test]
    fn empty_spec_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let limiter = CgroupLimiter::with_version(dir.path(), CgroupVersion::V1);
        limiter.apply(42, &ResourceSpec::default()).expect("apply");
        assert_eq!(std::fs::read_dir(dir.path()).expect("read_dir").count(), 0);
    }

    #[test]
    fn v1_writes_each_dimension_to_its_controller() {
        let dir = tempfile::tempdir().expect("tempdir");
        let limiter = CgroupLimiter::with_version(dir.path(), CgroupVersion::V1);
        let spec = ResourceSpec {
            memory: Some("100m".into()),
            cpuset: Some("0,1".into()),
            cpu_shares: Some(512),
        };
        limiter.apply(4242, &spec).expect("apply");

        let mem = dir.path().join("memory/burrow-4242");
        assert_eq!(read(mem.join("memory.limit_in_bytes")), "104857600");
        assert_eq!(read(mem.join("memory.swappiness")), "0");
        assert_eq!(read(mem.join("tasks")), "4242");

        let cpuset = dir.path().join("cpuset/burrow-4242");
        assert_eq!(read(cpuset.join("cpuset.cpus")), "0,1");
        assert_eq!(read(cpuset.join("cpuset.mems")), "0");
        assert_eq!(read(cpuset.join("tasks")), "4242");

        let cpu = dir.path().join("cpu/burrow-4242");
        assert_eq!(read(cpu.join("cpu.shares")), "512");
        assert_eq!(read(cpu.join("tasks")), "4242");
    }

    #[test]
    fn v2_writes_all_dimensions_to_one_group() {
        let dir = tempfile::tempdir().expect("tempdir");
        let limiter = CgroupLimiter::with_version(dir.path(), CgroupVersion::V2);
        let spec = ResourceSpec {
            memory: Some("1g".into()),
            cpuset: Some("2".into()),
            cpu_shares: Some(1024),
        };
        limiter.apply(7, &spec).expect("apply");

        let group = dir.path().join("burrow-7");
        assert_eq!(read(group.join("memory.max")), "1073741824");
        assert_eq!(read(group.join("memory.swap.max")), "0");
        assert_eq!(read(group.join("cpuset.cpus")), "2");
        assert_eq!(read(group.join("cpuset.mems")), "0");
        assert_eq!(read(group.join("cpu.weight")), "39");
        assert_eq!(read(group.join("cgroup.procs")), "7");
    }

    #[test]
    fn invalid_memory_does_not_block_other_dimensions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let limiter = CgroupLimiter::with_version(dir.path(), CgroupVersion::V1);
        let spec = ResourceSpec {
            memory: Some("abc".into()),
            cpuset: None,
            cpu_shares: Some(256),
        };
        let err = limiter.apply(9, &spec).expect_err("memory must fail");
        assert!(matches!(err, BurrowError::InvalidMemorySpec { .. }));
        assert_eq!(read(dir.path().join("cpu/burrow-9/cpu.shares")), "256");
        assert!(!dir.path().join("memory/burrow-9").exists());
    }

    #[test]
    fn control_file_failure_maps_to_resource_limit_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A regular file where the controller directory should be.
        std::fs::write(dir.path().join("cpu"), "").expect("write");
        let limiter = CgroupLimiter::with_version(dir.path(), CgroupVersion::V1);
        let spec = ResourceSpec {
            cpu_shares: Some(100),
            ..ResourceSpec::default()
        };
        let err = limiter.apply(5, &spec).expect_err("must fail");
        assert!(matches!(err, BurrowError::ResourceLimit { .. }));
    }

    #[test]
    fn remove_deletes_groups_and_ignores_missing_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let limiter = CgroupLimiter::with_version(dir.path(), CgroupVersion::V1);
        std::fs::create_dir_all(dir.path().join("memory/burrow-3")).expect("mkdir");
        limiter.remove(3).expect("remove");
        assert!(!dir.path().join("memory/burrow-3").exists());
        limiter.remove(3).expect("second remove is a no-op");
    }

    #[test]
    fn remove_attempts_every_group_after_a_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let limiter = CgroupLimiter::with_version(dir.path(), CgroupVersion::V1);
        // A leftover file keeps the memory group from being removed.
        let memory = dir.path().join("memory/burrow-8");
        std::fs::create_dir_all(&memory).expect("mkdir");
        std::fs::write(memory.join("tasks"), "8").expect("write");
        for controller in ["cpuset", "cpu"] {
            std::fs::create_dir_all(dir.path().join(controller).join("burrow-8")).expect("mkdir");
        }

        let err = limiter.remove(8).expect_err("memory group is busy");
        assert!(matches!(err, BurrowError::Io { .. }));
        assert!(memory.exists());
        assert!(!dir.path().join("cpuset/burrow-8").exists());
        assert!(!dir.path().join("cpu/burrow-8").exists());
    }
}
