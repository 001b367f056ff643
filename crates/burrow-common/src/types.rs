//! Domain primitive types used across the Burrow workspace.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BurrowError, Result};

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from an existing string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random 128-bit container ID as 32 hex digits.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns at most the first `len` characters of the id.
    #[must_use]
    pub fn prefix(&self, len: usize) -> &str {
        self.0
            .char_indices()
            .nth(len)
            .map_or(self.0.as_str(), |(end, _)| &self.0[..end])
    }

    /// Returns the fixed-length short form used for default names and listings.
    #[must_use]
    pub fn short(&self) -> &str {
        self.prefix(crate::constants::SHORT_ID_LEN)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a container image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(String);

impl ImageId {
    /// Creates a new image ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 hash digest used for content verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Creates a hash from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid 64-character hex string.
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into();
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BurrowError::Config {
                message: format!("invalid SHA-256 hex string: {hex}"),
            });
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Lifecycle status of a container.
///
/// There is no transition from `Stopped` back to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// The init process was spawned and has not been stopped or reaped.
    Running,
    /// The process was signaled or has exited.
    Stopped,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Resource limit request for a container.
///
/// All fields absent means no control group is touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Memory ceiling as a size string (`512k`, `100m`, `1g`, or raw bytes).
    pub memory: Option<String>,
    /// CPU core list, written verbatim (`0-2,4`).
    pub cpuset: Option<String>,
    /// Relative CPU weight in cgroup v1 share units.
    pub cpu_shares: Option<u64>,
}

impl ResourceSpec {
    /// Returns `true` when no dimension is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory.as_deref().is_none_or(str::is_empty)
            && self.cpuset.as_deref().is_none_or(str::is_empty)
            && self.cpu_shares.is_none_or(|s| s == 0)
    }
}

/// Network wiring mode of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Private network namespace attached to the shared bridge.
    Bridge,
    /// Shares the host network stack.
    Host,
    /// Private network namespace with loopback only.
    None,
}

impl NetworkMode {
    /// Returns whether the container needs its own network namespace.
    #[must_use]
    pub const fn isolates_network(self) -> bool {
        !matches!(self, Self::Host)
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bridge => write!(f, "bridge"),
            Self::Host => write!(f, "host"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for NetworkMode {
    type Err = BurrowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bridge" => Ok(Self::Bridge),
            "host" => Ok(Self::Host),
            "none" => Ok(Self::None),
            other => Err(BurrowError::NetworkSetup {
                message: format!("unsupported network mode: {other}"),
            }),
        }
    }
}

/// An IPv4 subnet in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Subnet {
    /// The default bridge subnet, `172.17.0.0/16`.
    pub const DEFAULT_BRIDGE: Self = Self {
        network: Ipv4Addr::new(172, 17, 0, 0),
        prefix_len: 16,
    };

    /// Creates a subnet, masking host bits off `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if `prefix_len` exceeds 32.
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > 32 {
            return Err(BurrowError::Config {
                message: format!("invalid prefix length /{prefix_len}"),
            });
        }
        let network = Ipv4Addr::from(u32::from(addr) & Self::mask_for(prefix_len));
        Ok(Self {
            network,
            prefix_len,
        })
    }

    const fn mask_for(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - prefix_len as u32)
        }
    }

    /// Returns the network address.
    #[must_use]
    pub const fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Returns the prefix length.
    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns the broadcast address.
    #[must_use]
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !Self::mask_for(self.prefix_len))
    }

    /// Returns the number of addresses in the subnet, including reserved ones.
    #[must_use]
    pub const fn size(&self) -> u64 {
        1u64 << (32 - self.prefix_len as u32)
    }

    /// Returns whether `addr` lies inside the subnet.
    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask_for(self.prefix_len) == u32::from(self.network)
    }
}

impl fmt::Display for Ipv4Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Ipv4Subnet {
    type Err = BurrowError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || BurrowError::Config {
            message: format!("invalid subnet: {s}"),
        };
        let (addr, len) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let len: u8 = len.parse().map_err(|_| invalid())?;
        Self::new(addr, len)
    }
}

impl TryFrom<String> for Ipv4Subnet {
    type Error = BurrowError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Ipv4Subnet> for String {
    fn from(value: Ipv4Subnet) -> Self {
        value.to_string()
    }
}

/// Result of wiring a container into the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// Mode that was applied.
    pub mode: NetworkMode,
    /// Address assigned to the container interface (bridge mode only).
    pub ip_address: Option<Ipv4Addr>,
    /// Default gateway inside the container (bridge mode only).
    pub gateway: Option<Ipv4Addr>,
    /// Subnet the address was allocated from (bridge mode only).
    pub subnet: Option<Ipv4Subnet>,
    /// Host-side veth endpoint attached to the bridge.
    pub host_veth: Option<String>,
    /// Container-side veth endpoint name after the rename.
    pub container_veth: Option<String>,
}

impl NetworkAttachment {
    /// Creates an attachment that carries only a mode.
    #[must_use]
    pub const fn mode_only(mode: NetworkMode) -> Self {
        Self {
            mode,
            ip_address: None,
            gateway: None,
            subnet: None,
            host_veth: None,
            container_veth: None,
        }
    }
}

/// A host path exposed inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMapping {
    /// Absolute path on the host.
    pub host_path: PathBuf,
    /// Absolute path inside the container rootfs.
    pub container_path: PathBuf,
}

impl FromStr for VolumeMapping {
    type Err = BurrowError;

    /// Parses `host:container`; both sides must be absolute.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| BurrowError::Config {
            message: format!("invalid volume mapping {s:?}: {why}"),
        };
        let (host, container) = s.split_once(':').ok_or_else(|| invalid("expected host:container"))?;
        if host.is_empty() || container.is_empty() || container.contains(':') {
            return Err(invalid("expected host:container"));
        }
        let container_path = PathBuf::from(container);
        if !container_path.is_absolute() {
            return Err(invalid("container path must be absolute"));
        }
        Ok(Self {
            host_path: PathBuf::from(host),
            container_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_hex() {
        let a = ContainerId::generate();
        let b = ContainerId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn short_id_is_twelve_characters() {
        let id = ContainerId::new("0123456789abcdef");
        assert_eq!(id.short(), "0123456789ab");
        assert_eq!(ContainerId::new("abc").short(), "abc");
    }

    #[test]
    fn empty_resource_spec_requests_nothing() {
        assert!(ResourceSpec::default().is_empty());
        let spec = ResourceSpec {
            memory: Some("100m".into()),
            ..ResourceSpec::default()
        };
        assert!(!spec.is_empty());
    }

    #[test]
    fn network_mode_parses_known_modes() {
        assert_eq!("bridge".parse::<NetworkMode>().unwrap(), NetworkMode::Bridge);
        assert_eq!("HOST".parse::<NetworkMode>().unwrap(), NetworkMode::Host);
        assert_eq!("none".parse::<NetworkMode>().unwrap(), NetworkMode::None);
    }

    #[test]
    fn network_mode_rejects_unknown_mode() {
        let err = "overlay".parse::<NetworkMode>().unwrap_err();
        assert!(matches!(err, BurrowError::NetworkSetup { .. }));
    }

    #[test]
    fn subnet_masks_host_bits_and_reports_bounds() {
        let subnet: Ipv4Subnet = "172.17.3.9/16".parse().unwrap();
        assert_eq!(subnet.network(), Ipv4Addr::new(172, 17, 0, 0));
        assert_eq!(subnet.broadcast(), Ipv4Addr::new(172, 17, 255, 255));
        assert_eq!(subnet.size(), 65_536);
        assert!(subnet.contains(Ipv4Addr::new(172, 17, 200, 1)));
        assert!(!subnet.contains(Ipv4Addr::new(172, 18, 0, 1)));
        assert_eq!(subnet.to_string(), "172.17.0.0/16");
    }

    #[test]
    fn subnet_rejects_garbage() {
        assert!("172.17.0.0".parse::<Ipv4Subnet>().is_err());
        assert!("172.17.0.0/33".parse::<Ipv4Subnet>().is_err());
    }

    #[test]
    fn volume_mapping_requires_absolute_container_path() {
        let v: VolumeMapping = "/srv/data:/data".parse().unwrap();
        assert_eq!(v.host_path, PathBuf::from("/srv/data"));
        assert_eq!(v.container_path, PathBuf::from("/data"));
        assert!("/srv/data:data".parse::<VolumeMapping>().is_err());
        assert!("/srv/data".parse::<VolumeMapping>().is_err());
    }
}
