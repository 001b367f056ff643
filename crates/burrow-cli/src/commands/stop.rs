//! `brw stop`: stop running containers.

use burrow_common::config::RuntimeConfig;
use burrow_runtime::Orchestrator;
use clap::Args;

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container ids, id prefixes, or names.
    #[arg(required = true)]
    pub containers: Vec<String>,
}

/// Executes the `stop` command.
///
/// Prints each container that was stopped.
///
/// # Errors
///
/// Returns an error if any container could not be stopped.
pub fn execute(args: &StopArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::open(config)?;
    super::for_each_container(&orchestrator, &args.containers, ("stop", "stopped"), |id| {
        orchestrator.stop(id)
    })
}
