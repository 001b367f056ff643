//! Virtual ethernet pairs linking a container namespace to the bridge.

use std::net::Ipv4Addr;

use burrow_common::constants::CONTAINER_IFNAME;
use burrow_common::error::Result;
use burrow_common::types::ContainerId;

use super::command::{CommandRunner, failure, run_checked};

/// Interface names of one veth pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPair {
    /// Endpoint that stays on the host and joins the bridge.
    pub host: String,
    /// Endpoint moved into the container before being renamed.
    pub peer: String,
}

impl VethPair {
    /// Derives pair names from a container id. Both fit the 15-byte
    /// interface name limit.
    #[must_use]
    pub fn for_container(id: &ContainerId) -> Self {
        Self {
            host: format!("veth{}", id.prefix(8)),
            peer: format!("ceth{}", id.prefix(7)),
        }
    }
}

/// Addressing applied to the container side of a pair.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceConfig {
    /// Container address.
    pub address: Ipv4Addr,
    /// Prefix length of the bridge subnet.
    pub prefix_len: u8,
    /// Default route target.
    pub gateway: Ipv4Addr,
}

/// Creates the pair, plugs the host end into `bridge`, and configures the
/// container end inside the network namespace of `pid` as `eth0`.
///
/// # Errors
///
/// Returns `NetworkSetup` on the first failing step. Already-created links
/// are left for the caller to remove with [`delete`].
pub fn connect(
    runner: &dyn CommandRunner,
    pair: &VethPair,
    bridge: &str,
    pid: u32,
    iface: InterfaceConfig,
) -> Result<()> {
    let pid = pid.to_string();
    let cidr = format!("{}/{}", iface.address, iface.prefix_len);
    let gateway = iface.gateway.to_string();

    let _ = run_checked(
        runner,
        "ip",
        &["link", "add", &pair.host, "type", "veth", "peer", "name", &pair.peer],
    )?;
    let _ = run_checked(runner, "ip", &["link", "set", "dev", &pair.host, "master", bridge])?;
    let _ = run_checked(runner, "ip", &["link", "set", "dev", &pair.host, "up"])?;
    let _ = run_checked(runner, "ip", &["link", "set", &pair.peer, "netns", &pid])?;

    in_netns(runner, &pid, &["link", "set", "dev", &pair.peer, "name", CONTAINER_IFNAME])?;
    in_netns(runner, &pid, &["addr", "add", &cidr, "dev", CONTAINER_IFNAME])?;
    in_netns(runner, &pid, &["link", "set", "dev", CONTAINER_IFNAME, "up"])?;
    in_netns(runner, &pid, &["link", "set", "dev", "lo", "up"])?;
    in_netns(runner, &pid, &["route", "add", "default", "via", &gateway])?;

    tracing::info!(host = %pair.host, address = %cidr, %gateway, "container interface configured");
    Ok(())
}

/// Deletes the host end of a pair, which removes both ends.
///
/// A pair that is already gone, for example because its namespace died
/// with the container, counts as deleted.
///
/// # Errors
///
/// Returns `NetworkSetup` for any other failure.
pub fn delete(runner: &dyn CommandRunner, host: &str) -> Result<()> {
    let out = runner.run("ip", &["link", "delete", host])?;
    if out.success || out.stderr.contains("Cannot find device") {
        Ok(())
    } else {
        Err(failure("ip", &["link", "delete", host], &out))
    }
}

fn in_netns(runner: &dyn CommandRunner, pid: &str, ip_args: &[&str]) -> Result<()> {
    let mut args = vec!["-t", pid, "-n", "ip"];
    args.extend_from_slice(ip_args);
    let _ = run_checked(runner, "nsenter", &args)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::command::fake::FakeRunner;

    fn iface() -> InterfaceConfig {
        InterfaceConfig {
            address: Ipv4Addr::new(172, 17, 0, 2),
            prefix_len: 16,
            gateway: Ipv4Addr::new(172, 17, 0, 1),
        }
    }

    #[test]
    fn pair_names_fit_interface_limit() {
        let id = ContainerId::new("0123456789abcdef0123456789abcdef");
        let pair = VethPair::for_container(&id);
        assert_eq!(pair.host, "veth01234567");
        assert_eq!(pair.peer, "ceth0123456");
        assert!(pair.host.len() <= 15 && pair.peer.len() <= 15);
    }

    #[test]
    fn connect_runs_steps_in_order() {
        let runner = FakeRunner::default();
        let pair = VethPair::for_container(&ContainerId::new("abcdef0123456789"));
        connect(&runner, &pair, "burrow0", 4242, iface()).unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0], "ip link add vethabcdef01 type veth peer name cethabcdef0");
        assert_eq!(calls[1], "ip link set dev vethabcdef01 master burrow0");
        assert_eq!(calls[3], "ip link set cethabcdef0 netns 4242");
        assert_eq!(calls[4], "nsenter -t 4242 -n ip link set dev cethabcdef0 name eth0");
        assert_eq!(calls[5], "nsenter -t 4242 -n ip addr add 172.17.0.2/16 dev eth0");
        assert_eq!(
            calls.last().unwrap(),
            "nsenter -t 4242 -n ip route add default via 172.17.0.1"
        );
    }

    #[test]
    fn delete_tolerates_missing_link() {
        let runner = FakeRunner::default();
        delete(&runner, "vethgone").unwrap();
    }
}
