//! Environment contract between the launcher and the container init.
//!
//! The init process shares no memory with its parent, so everything it
//! needs travels in environment variables. The argument vector and volume
//! list are JSON-encoded so arguments containing spaces survive intact.
//! The rootfs path is passed as raw bytes so non-UTF-8 paths are kept.

use std::ffi::OsString;
use std::path::PathBuf;

use burrow_common::constants::CONTAINER_PATH;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerId, VolumeMapping};

/// Container id.
pub const ENV_CONTAINER_ID: &str = "BURROW_CONTAINER_ID";
/// Container name, used as hostname.
pub const ENV_CONTAINER_NAME: &str = "BURROW_CONTAINER_NAME";
/// JSON array of strings.
pub const ENV_ARGV: &str = "BURROW_ARGV";
/// Absolute rootfs path on the host.
pub const ENV_ROOTFS: &str = "BURROW_ROOTFS";
/// JSON array of volume mappings.
pub const ENV_VOLUMES: &str = "BURROW_VOLUMES";
/// Descriptor the init blocks on until the parent finishes setup.
pub const ENV_START_FD: &str = "BURROW_START_FD";

/// Everything the init process needs to build the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitHandoff {
    /// Container id.
    pub container_id: ContainerId,
    /// Container name.
    pub name: String,
    /// Argument vector to execute.
    pub argv: Vec<String>,
    /// Root filesystem to enter.
    pub rootfs: PathBuf,
    /// Bind mounts to create before entering the rootfs.
    pub volumes: Vec<VolumeMapping>,
    /// Start gate descriptor, if the launcher provides one.
    pub start_fd: Option<i32>,
}

impl InitHandoff {
    /// Encodes the handoff as the complete environment of the init process.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the argv or volumes cannot be encoded.
    pub fn to_env(&self) -> Result<Vec<(OsString, OsString)>> {
        let mut env: Vec<(OsString, OsString)> = vec![
            (ENV_CONTAINER_ID.into(), self.container_id.to_string().into()),
            (ENV_CONTAINER_NAME.into(), self.name.clone().into()),
            (ENV_ARGV.into(), serde_json::to_string(&self.argv)?.into()),
            (ENV_ROOTFS.into(), self.rootfs.clone().into_os_string()),
            ("PATH".into(), CONTAINER_PATH.into()),
            ("TERM".into(), "xterm".into()),
        ];
        if !self.volumes.is_empty() {
            env.push((ENV_VOLUMES.into(), serde_json::to_string(&self.volumes)?.into()));
        }
        if let Some(fd) = self.start_fd {
            env.push((ENV_START_FD.into(), fd.to_string().into()));
        }
        Ok(env)
    }

    /// Decodes a handoff from environment pairs.
    ///
    /// # Errors
    ///
    /// Returns `MissingConfiguration` if the rootfs or argv is absent or the
    /// argv is empty, `Config` if a text value is not UTF-8, and
    /// `Serialization` if an encoded value is malformed.
    pub fn from_env<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut id = None;
        let mut name = None;
        let mut argv = None;
        let mut rootfs: Option<OsString> = None;
        let mut volumes = None;
        let mut start_fd = None;
        for (key, value) in vars {
            let key = key.into();
            let value = value.into();
            match key.to_str() {
                Some(ENV_CONTAINER_ID) => id = Some(text(ENV_CONTAINER_ID, value)?),
                Some(ENV_CONTAINER_NAME) => name = Some(text(ENV_CONTAINER_NAME, value)?),
                Some(ENV_ARGV) => argv = Some(text(ENV_ARGV, value)?),
                Some(ENV_ROOTFS) => rootfs = Some(value),
                Some(ENV_VOLUMES) => volumes = Some(text(ENV_VOLUMES, value)?),
                Some(ENV_START_FD) => start_fd = value.to_str().and_then(|v| v.parse().ok()),
                _ => {}
            }
        }

        let rootfs = rootfs
            .filter(|r| !r.is_empty())
            .ok_or(BurrowError::MissingConfiguration { variable: ENV_ROOTFS })?;
        let argv: Vec<String> = serde_json::from_str(
            &argv.ok_or(BurrowError::MissingConfiguration { variable: ENV_ARGV })?,
        )?;
        if argv.first().is_none_or(String::is_empty) {
            return Err(BurrowError::MissingConfiguration { variable: ENV_ARGV });
        }
        let volumes = match volumes {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };

        let container_id = ContainerId::new(id.unwrap_or_default());
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| container_id.short().to_string());
        Ok(Self {
            container_id,
            name,
            argv,
            rootfs: PathBuf::from(rootfs),
            volumes,
            start_fd,
        })
    }

    /// Decodes the handoff from the current process environment.
    ///
    /// # Errors
    ///
    /// See [`InitHandoff::from_env`].
    pub fn from_process_env() -> Result<Self> {
        Self::from_env(std::env::vars_os())
    }
}

fn text(variable: &str, value: OsString) -> Result<String> {
    value.into_string().map_err(|_| BurrowError::Config {
        message: format!("{variable} is not valid UTF-8"),
    })
}
