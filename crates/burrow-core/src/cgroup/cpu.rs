//! CPU weight control.
//!
//! The requested weight is expressed in v1 share units (default 1024).
//! On v2 it is converted into the `cpu.weight` range.

use burrow_common::error::Result;

use super::{CgroupLimiter, CgroupVersion};

/// v1 controller hierarchy name.
pub const CONTROLLER: &str = "cpu";

const MIN_SHARES: u64 = 2;
const MAX_SHARES: u64 = 262_144;
const MIN_WEIGHT: u64 = 1;
const MAX_WEIGHT: u64 = 10_000;

/// Converts v1 CPU shares into a v2 `cpu.weight` value.
#[must_use]
pub fn shares_to_weight(shares: u64) -> u64 {
    let shares = shares.clamp(MIN_SHARES, MAX_SHARES);
    MIN_WEIGHT + ((shares - MIN_SHARES) * (MAX_WEIGHT - MIN_WEIGHT)) / (MAX_SHARES - MIN_SHARES)
}

/// Applies a CPU weight to `pid`.
pub(crate) fn apply(limiter: &CgroupLimiter, pid: u32, shares: u64) -> Result<()> {
    let setting = match limiter.version() {
        CgroupVersion::V1 => ("cpu.shares", shares.to_string()),
        CgroupVersion::V2 => ("cpu.weight", shares_to_weight(shares).to_string()),
    };
    let _ = limiter.configure_group(CONTROLLER, pid, &[setting])?;
    tracing::debug!(pid, shares, "CPU weight set");
    Ok(())
}
