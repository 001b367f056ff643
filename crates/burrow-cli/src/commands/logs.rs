//! `brw logs`: print the captured output of a container.

use std::io::Write;

use burrow_common::config::RuntimeConfig;
use burrow_runtime::Orchestrator;
use clap::Args;

/// Arguments for the `logs` command.
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Container id, id prefix, or name.
    pub container: String,
}

/// Executes the `logs` command.
///
/// # Errors
///
/// Returns an error if the container is not found or its log is unreadable.
pub fn execute(args: &LogsArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::open(config)?;
    let id = orchestrator.resolve(&args.container)?;
    let logs = orchestrator.logs(&id)?;

    if logs.is_empty() {
        eprintln!("No logs available for container: {}", args.container);
    } else {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(logs.as_bytes())?;
        stdout.flush()?;
    }

    Ok(())
}
