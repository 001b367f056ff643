//! Memory ceiling control.
//!
//! Writes an absolute byte limit and disables swap for the group.

use burrow_common::error::{BurrowError, Result};

use super::{CgroupLimiter, CgroupVersion};

/// v1 controller hierarchy name.
pub const CONTROLLER: &str = "memory";

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// Parses a size string such as `512k`, `100m`, `1g`, or `2048` into bytes.
///
/// Suffixes are binary multiples and case-insensitive. A bare number is
/// taken as bytes.
///
/// # Errors
///
/// Returns `InvalidMemorySpec` if the number is missing, malformed, or overflows.
pub fn parse_memory_limit(input: &str) -> Result<u64> {
    let invalid = || BurrowError::InvalidMemorySpec {
        value: input.to_string(),
    };
    let lowered = input.trim().to_ascii_lowercase();
    let (digits, multiplier) = match lowered.as_bytes().last() {
        Some(b'k') => (&lowered[..lowered.len() - 1], KIB),
        Some(b'm') => (&lowered[..lowered.len() - 1], MIB),
        Some(b'g') => (&lowered[..lowered.len() - 1], GIB),
        _ => (lowered.as_str(), 1),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}

/// Applies a memory ceiling to `pid`.
pub(crate) fn apply(limiter: &CgroupLimiter, pid: u32, limit: &str) -> Result<()> {
    let bytes = parse_memory_limit(limit)?;
    let settings = match limiter.version() {
        CgroupVersion::V1 => [
            ("memory.limit_in_bytes", bytes.to_string()),
            ("memory.swappiness", "0".to_string()),
        ],
        CgroupVersion::V2 => [
            ("memory.max", bytes.to_string()),
            ("memory.swap.max", "0".to_string()),
        ],
    };
    let _ = limiter.configure_group(CONTROLLER, pid, &settings)?;
    tracing::debug!(pid, bytes, "memory limit set");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binary_suffixes() {
        assert_eq!(parse_memory_limit("100m").unwrap(), 104_857_600);
        assert_eq!(parse_memory_limit("1g").unwrap(), 1_073_741_824);
        assert_eq!(parse_memory_limit("512k").unwrap(), 524_288);
    }

    #[test]
    fn unsuffixed_value_is_bytes() {
        assert_eq!(parse_memory_limit("2048").unwrap(), 2048);
    }

    #[test]
    fn suffix_is_case_insensitive() {
        assert_eq!(parse_memory_limit("2G").unwrap(), 2 * GIB);
        assert_eq!(parse_memory_limit(" 64M ").unwrap(), 64 * MIB);
    }

    #[test]
    fn malformed_input_is_rejected() {
        for bad in ["abc", "", "m", "-5m", "1.5g", "10mb", "99999999999999999999g"] {
            let err = parse_memory_limit(bad).unwrap_err();
            assert!(
                matches!(err, BurrowError::InvalidMemorySpec { .. }),
                "{bad:?} should be rejected"
            );
        }
    }
}
