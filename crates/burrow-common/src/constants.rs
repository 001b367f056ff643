//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Default base directory for Burrow state and container data.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/burrow";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "BURROW_DATA_DIR";

/// Returns the data directory, preferring `$BURROW_DATA_DIR` when set and
/// falling back to `/var/lib/burrow`.
fn resolve_data_dir() -> PathBuf {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(SYSTEM_DATA_DIR),
    }
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this process.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(resolve_data_dir)
}

/// Cgroup filesystem mount point (v1 controllers or v2 unified hierarchy).
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Prefix of every control group directory created for a container process.
pub const CGROUP_PREFIX: &str = "burrow-";

/// Name of the per-container directory root under the data directory.
pub const CONTAINERS_DIR_NAME: &str = "containers";

/// Name of the image store root under the data directory.
pub const IMAGES_DIR_NAME: &str = "images";

/// Name of the registry state file under the data directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Readiness marker written by the image provider into a container directory.
pub const ROOTFS_READY_MARKER: &str = ".rootfs_ready";

/// Log file capturing a detached container's stdout and stderr.
pub const CONTAINER_LOG_NAME: &str = "container.log";

/// Number of leading id characters used as the default container name.
pub const SHORT_ID_LEN: usize = 12;

/// Default tag applied to image references without one.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Shared bridge device connecting all bridge-mode containers.
pub const DEFAULT_BRIDGE: &str = "burrow0";

/// Subnet from which bridge-mode container addresses are allocated.
pub const DEFAULT_SUBNET: &str = "172.17.0.0/16";

/// Gateway address assigned to the bridge device.
pub const DEFAULT_GATEWAY: &str = "172.17.0.1";

/// Interface name of the container-facing veth endpoint.
pub const CONTAINER_IFNAME: &str = "eth0";

/// Marker argument that makes the binary run the isolation bootstrapper.
pub const INIT_ARG: &str = "init";

/// Search path handed to the container init process.
pub const CONTAINER_PATH: &str = "/bin:/usr/bin:/sbin:/usr/sbin";

/// Application name used in CLI output and state files.
pub const APP_NAME: &str = "burrow";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "brw";
