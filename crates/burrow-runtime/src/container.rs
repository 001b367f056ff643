//! Container configuration and the record tracked for each container.

use std::path::PathBuf;

use burrow_common::types::{
    ContainerId, ContainerStatus, NetworkAttachment, NetworkMode, ResourceSpec, VolumeMapping,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Desired shape of a container. Never mutated after spawn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Requested name; empty means "derive from the id".
    pub name: String,
    /// Image reference handed to the image provider.
    pub image: String,
    /// Argument vector; the first element is the program.
    pub command: Vec<String>,
    /// Attach the caller's terminal instead of writing a log file.
    pub tty: bool,
    /// Caller does not wait for the container to exit.
    pub detach: bool,
    /// Network mode; `None` behaves like [`NetworkMode::None`].
    pub network: Option<NetworkMode>,
    /// Host paths bind-mounted into the rootfs.
    pub volumes: Vec<VolumeMapping>,
    /// Control-group limits.
    pub resources: ResourceSpec,
}

impl ContainerConfig {
    /// Network mode actually applied to the container.
    #[must_use]
    pub fn network_mode(&self) -> NetworkMode {
        self.network.unwrap_or(NetworkMode::None)
    }
}

/// The unit of lifecycle tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Unique identifier.
    pub id: ContainerId,
    /// Name, unique among registered records.
    pub name: String,
    /// Host pid of the container init process.
    pub pid: u32,
    /// Current lifecycle status.
    pub status: ContainerStatus,
    /// Root filesystem the container was started on.
    pub rootfs: PathBuf,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Originating configuration.
    pub config: ContainerConfig,
    /// Network wiring, when an attachment was made.
    pub network: Option<NetworkAttachment>,
}

impl ContainerRecord {
    /// Image reference the container runs.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.config.image
    }

    /// Argument vector the container runs.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.config.command
    }

    /// Returns whether the record still counts as running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_network_mode_means_none() {
        let config = ContainerConfig::default();
        assert_eq!(config.network_mode(), NetworkMode::None);
        let config = ContainerConfig {
            network: Some(NetworkMode::Bridge),
            ..ContainerConfig::default()
        };
        assert_eq!(config.network_mode(), NetworkMode::Bridge);
    }

    #[test]
    fn record_serializes_status_in_lowercase() {
        let record = ContainerRecord {
            id: ContainerId::new("abc"),
            name: "web".into(),
            pid: 42,
            status: ContainerStatus::Running,
            rootfs: PathBuf::from("/rootfs"),
            created_at: Utc::now(),
            config: ContainerConfig {
                image: "alpine".into(),
                command: vec!["/bin/sh".into()],
                ..ContainerConfig::default()
            },
            network: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"running\""));
        let back: ContainerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.image(), "alpine");
        assert_eq!(back.command(), ["/bin/sh".to_string()]);
    }
}
