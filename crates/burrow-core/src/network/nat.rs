//! IPv4 forwarding and source NAT for the bridge subnet.

use burrow_common::error::Result;
use burrow_common::types::Ipv4Subnet;

use super::command::{CommandRunner, run_checked};

/// Turns on IPv4 forwarding on the host.
///
/// # Errors
///
/// Returns `NetworkSetup` if `sysctl` fails.
pub fn enable_forwarding(runner: &dyn CommandRunner) -> Result<()> {
    let _ = run_checked(runner, "sysctl", &["-w", "net.ipv4.ip_forward=1"])?;
    Ok(())
}

/// Masquerades traffic from `subnet` that leaves through any interface
/// other than `bridge`. The rule is added only once.
///
/// # Errors
///
/// Returns `NetworkSetup` if the rule cannot be appended.
pub fn ensure_masquerade(runner: &dyn CommandRunner, subnet: &Ipv4Subnet, bridge: &str) -> Result<()> {
    let source = subnet.to_string();
    let rule = ["POSTROUTING", "-s", &source, "!", "-o", bridge, "-j", "MASQUERADE"];

    let mut check = vec!["-t", "nat", "-C"];
    check.extend_from_slice(&rule);
    if runner.run("iptables", &check)?.success {
        tracing::debug!(subnet = %subnet, "masquerade rule already present");
        return Ok(());
    }

    let mut append = vec!["-t", "nat", "-A"];
    append.extend_from_slice(&rule);
    let _ = run_checked(runner, "iptables", &append)?;
    tracing::info!(subnet = %subnet, bridge, "masquerade rule added");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::command::fake::FakeRunner;

    #[test]
    fn masquerade_rule_is_appended_once() {
        let runner = FakeRunner::default();
        let subnet: Ipv4Subnet = "172.17.0.0/16".parse().unwrap();
        ensure_masquerade(&runner, &subnet, "burrow0").unwrap();
        ensure_masquerade(&runner, &subnet, "burrow0").unwrap();
        assert_eq!(runner.count("-A POSTROUTING"), 1);
        assert!(runner.calls().contains(
            &"iptables -t nat -A POSTROUTING -s 172.17.0.0/16 ! -o burrow0 -j MASQUERADE".to_string()
        ));
    }

    #[test]
    fn forwarding_failure_is_an_error() {
        let runner = FakeRunner::failing_on("ip_forward");
        assert!(enable_forwarding(&runner).is_err());
    }
}
