//! UTS namespace hostname.

use burrow_common::error::{BurrowError, Result};

/// Sets the hostname inside the caller's UTS namespace.
///
/// # Errors
///
/// Returns `Namespace` if `sethostname(2)` fails.
pub fn set_hostname(hostname: &str) -> Result<()> {
    nix::unistd::sethostname(hostname).map_err(|e| BurrowError::Namespace {
        message: format!("sethostname({hostname}) failed: {e}"),
    })?;
    tracing::debug!(hostname, "container hostname set");
    Ok(())
}
