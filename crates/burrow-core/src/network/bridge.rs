//! The shared host bridge that bridge-mode containers attach to.

use std::net::Ipv4Addr;

use burrow_common::error::Result;

use super::command::{CommandRunner, run_checked, run_idempotent};

/// Creates `name`, assigns `gateway/prefix_len`, and brings it up.
///
/// Every step tolerates the bridge or address already being present, so
/// repeated calls converge on the same state.
///
/// # Errors
///
/// Returns `NetworkSetup` if any `ip` invocation fails for another reason.
pub fn ensure(runner: &dyn CommandRunner, name: &str, gateway: Ipv4Addr, prefix_len: u8) -> Result<()> {
    run_idempotent(runner, "ip", &["link", "add", "name", name, "type", "bridge"])?;
    let cidr = format!("{gateway}/{prefix_len}");
    run_idempotent(runner, "ip", &["addr", "add", &cidr, "dev", name])?;
    let _ = run_checked(runner, "ip", &["link", "set", "dev", name, "up"])?;
    tracing::info!(bridge = name, address = %cidr, "bridge ready");
    Ok(())
}
