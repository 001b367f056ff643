//! Global configuration model for the Burrow runtime.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::types::Ipv4Subnet;

/// Root configuration for the Burrow runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Base directory for state, images, and per-container data.
    pub data_dir: PathBuf,
    /// Mount point of the cgroup filesystem.
    pub cgroup_root: PathBuf,
    /// Name of the shared bridge device.
    pub bridge_name: String,
    /// Subnet used for bridge-mode address allocation.
    pub subnet: Ipv4Subnet,
    /// Address of the bridge, used as default route inside containers.
    pub gateway: Ipv4Addr,
}

impl RuntimeConfig {
    /// Creates a configuration rooted at `data_dir` with default networking.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Directory holding one subdirectory per container.
    #[must_use]
    pub fn containers_dir(&self) -> PathBuf {
        self.data_dir.join(constants::CONTAINERS_DIR_NAME)
    }

    /// Directory of a single container.
    #[must_use]
    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.containers_dir().join(id)
    }

    /// Root of the local image store.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join(constants::IMAGES_DIR_NAME)
    }

    /// Path of the persisted registry.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join(constants::STATE_FILE_NAME)
    }

    /// Returns the data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: constants::data_dir().clone(),
            cgroup_root: PathBuf::from(constants::CGROUP_ROOT),
            bridge_name: constants::DEFAULT_BRIDGE.to_string(),
            subnet: Ipv4Subnet::DEFAULT_BRIDGE,
            gateway: Ipv4Addr::new(172, 17, 0, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_live_under_data_dir() {
        let cfg = RuntimeConfig::with_data_dir("/tmp/burrow-test");
        assert_eq!(cfg.containers_dir(), PathBuf::from("/tmp/burrow-test/containers"));
        assert_eq!(cfg.container_dir("abc"), PathBuf::from("/tmp/burrow-test/containers/abc"));
        assert_eq!(cfg.images_dir(), PathBuf::from("/tmp/burrow-test/images"));
        assert_eq!(cfg.state_file(), PathBuf::from("/tmp/burrow-test/state.json"));
    }

    #[test]
    fn default_network_matches_constants() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.subnet.to_string(), constants::DEFAULT_SUBNET);
        assert_eq!(cfg.gateway.to_string(), constants::DEFAULT_GATEWAY);
        assert_eq!(cfg.bridge_name, constants::DEFAULT_BRIDGE);
    }

    #[test]
    fn config_serializes_subnet_as_cidr_string() {
        let cfg = RuntimeConfig::with_data_dir("/d");
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"172.17.0.0/16\""));
        let back: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
