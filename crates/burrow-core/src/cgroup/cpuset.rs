//! CPU core affinity control.

use burrow_common::error::Result;

use super::CgroupLimiter;

/// v1 controller hierarchy name.
pub const CONTROLLER: &str = "cpuset";

// Single memory node; NUMA placement is not modelled.
const DEFAULT_MEMS: &str = "0";

/// Pins `pid` to the cores listed in `cpus`.
pub(crate) fn apply(limiter: &CgroupLimiter, pid: u32, cpus: &str) -> Result<()> {
    let settings = [
        ("cpuset.cpus", cpus.trim().to_string()),
        ("cpuset.mems", DEFAULT_MEMS.to_string()),
    ];
    let _ = limiter.configure_group(CONTROLLER, pid, &settings)?;
    tracing::debug!(pid, cpus, "cpuset applied");
    Ok(())
}
