//! `brw init`: the first process of every container.
//!
//! Invoked only by the runtime itself after cloning into new namespaces.

/// Executes the container init.
///
/// Only returns on failure; on success the process becomes the container
/// command.
///
/// # Errors
///
/// Returns the first failed setup step.
pub fn execute() -> anyhow::Result<()> {
    match burrow_runtime::init::run() {
        Ok(never) => match never {},
        Err(e) => {
            tracing::error!(error = %e, "container init failed");
            Err(e.into())
        }
    }
}
