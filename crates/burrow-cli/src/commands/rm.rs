//! `brw rm`: remove containers.

use burrow_common::config::RuntimeConfig;
use burrow_runtime::Orchestrator;
use clap::Args;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container ids, id prefixes, or names.
    #[arg(required = true)]
    pub containers: Vec<String>,
}

/// Executes the `rm` command.
///
/// Running containers are stopped first.
///
/// # Errors
///
/// Returns an error if any container could not be removed.
pub fn execute(args: &RmArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::open(config)?;
    super::for_each_container(&orchestrator, &args.containers, ("remove", "removed"), |id| {
        orchestrator.remove(id)
    })
}
