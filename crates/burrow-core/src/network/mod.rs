//! Container network provisioning.
//!
//! Bridge-mode containers get a veth pair whose host end joins a shared
//! bridge and whose container end becomes `eth0` with an address from the
//! bridge subnet. Outbound traffic is masqueraded. Host and none modes need
//! no host-side wiring.

pub mod bridge;
pub mod command;
pub mod ipam;
pub mod nat;
pub mod veth;

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

use burrow_common::config::RuntimeConfig;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerId, Ipv4Subnet, NetworkAttachment, NetworkMode};

use self::command::{CommandRunner, SystemRunner};
use self::ipam::Ipam;
use self::veth::{InterfaceConfig, VethPair};

/// Wires containers into the host network.
///
/// Safe to share between threads: bridge setup runs at most once at a
/// time and address allocation is serialized.
pub struct NetworkProvisioner {
    runner: Arc<dyn CommandRunner>,
    bridge_name: String,
    subnet: Ipv4Subnet,
    gateway: Ipv4Addr,
    bridge_ready: Mutex<bool>,
    ipam: Mutex<Ipam>,
}

impl std::fmt::Debug for NetworkProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkProvisioner")
            .field("bridge_name", &self.bridge_name)
            .field("subnet", &self.subnet)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl NetworkProvisioner {
    /// Creates a provisioner that runs the host's networking tools.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configured subnet or gateway is unusable.
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        Self::with_runner(config, Arc::new(SystemRunner))
    }

    /// Creates a provisioner that executes commands through `runner`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the configured subnet or gateway is unusable.
    pub fn with_runner(config: &RuntimeConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        Ok(Self {
            runner,
            bridge_name: config.bridge_name.clone(),
            subnet: config.subnet,
            gateway: config.gateway,
            bridge_ready: Mutex::new(false),
            ipam: Mutex::new(Ipam::new(config.subnet, config.gateway)?),
        })
    }

    /// Connects the process `pid` according to `mode`.
    ///
    /// Host and none modes need no host-side action. For bridge mode `pid`
    /// must already live in its own network namespace.
    ///
    /// # Errors
    ///
    /// Returns `NetworkSetup` if the bridge, forwarding, address pool, or
    /// interface setup fails. A failed bridge attachment releases its
    /// address and removes any half-created link.
    pub fn attach(&self, id: &ContainerId, pid: u32, mode: NetworkMode) -> Result<NetworkAttachment> {
        match mode {
            NetworkMode::Host | NetworkMode::None => Ok(NetworkAttachment::mode_only(mode)),
            NetworkMode::Bridge => self.attach_bridge(id, pid),
        }
    }

    /// Removes the host-side wiring of an attachment and frees its address.
    ///
    /// # Errors
    ///
    /// Returns `NetworkSetup` if the veth pair exists but cannot be deleted.
    /// The address is released regardless.
    pub fn detach(&self, attachment: &NetworkAttachment) -> Result<()> {
        let deleted = attachment
            .host_veth
            .as_deref()
            .map_or(Ok(()), |host| veth::delete(self.runner.as_ref(), host));
        if let Some(addr) = attachment.ip_address {
            self.lock_ipam()?.release(addr);
        }
        tracing::debug!(ip = ?attachment.ip_address, "network detached");
        deleted
    }

    /// Marks the address of a previously persisted attachment as in use.
    ///
    /// # Errors
    ///
    /// Returns `NetworkSetup` if the address lies outside the bridge subnet.
    pub fn restore(&self, attachment: &NetworkAttachment) -> Result<()> {
        let Some(addr) = attachment.ip_address else {
            return Ok(());
        };
        if !self.lock_ipam()?.reserve(addr)? {
            tracing::debug!(%addr, "address already reserved");
        }
        Ok(())
    }

    /// Number of container addresses currently handed out.
    ///
    /// # Errors
    ///
    /// Returns `NetworkSetup` if the address pool lock is poisoned.
    pub fn allocated_addresses(&self) -> Result<usize> {
        Ok(self.lock_ipam()?.allocated())
    }

    /// Creates and configures the bridge once per provisioner.
    ///
    /// Forwarding is required. The masquerade rule is best-effort because
    /// containers still reach each other and the host without it.
    ///
    /// # Errors
    ///
    /// Returns `NetworkSetup` if the bridge or forwarding cannot be set up.
    pub fn ensure_bridge(&self) -> Result<()> {
        let mut ready = self.bridge_ready.lock().map_err(|_| BurrowError::NetworkSetup {
            message: "bridge lock poisoned".into(),
        })?;
        if *ready {
            return Ok(());
        }
        let runner = self.runner.as_ref();
        bridge::ensure(runner, &self.bridge_name, self.gateway, self.subnet.prefix_len())?;
        nat::enable_forwarding(runner)?;
        if let Err(e) = nat::ensure_masquerade(runner, &self.subnet, &self.bridge_name) {
            tracing::warn!(error = %e, "outbound NAT unavailable");
        }
        *ready = true;
        Ok(())
    }

    fn attach_bridge(&self, id: &ContainerId, pid: u32) -> Result<NetworkAttachment> {
        self.ensure_bridge()?;
        let address = self.lock_ipam()?.allocate()?;
        let pair = VethPair::for_container(id);
        let iface = InterfaceConfig {
            address,
            prefix_len: self.subnet.prefix_len(),
            gateway: self.gateway,
        };

        if let Err(e) = veth::connect(self.runner.as_ref(), &pair, &self.bridge_name, pid, iface) {
            tracing::warn!(container_id = %id, error = %e, "rolling back network attachment");
            if let Err(cleanup) = veth::delete(self.runner.as_ref(), &pair.host) {
                tracing::warn!(host = %pair.host, error = %cleanup, "veth cleanup failed");
            }
            self.lock_ipam()?.release(address);
            return Err(e);
        }

        Ok(NetworkAttachment {
            mode: NetworkMode::Bridge,
            ip_address: Some(address),
            gateway: Some(self.gateway),
            subnet: Some(self.subnet),
            host_veth: Some(pair.host),
            container_veth: Some(burrow_common::constants::CONTAINER_IFNAME.to_string()),
        })
    }

    fn lock_ipam(&self) -> Result<MutexGuard<'_, Ipam>> {
        self.ipam.lock().map_err(|_| BurrowError::NetworkSetup {
            message: "address pool lock poisoned".into(),
        })
    }
}
