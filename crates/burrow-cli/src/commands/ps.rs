//! `brw ps`: list containers.

use burrow_common::config::RuntimeConfig;
use burrow_runtime::Orchestrator;
use clap::Args;

use crate::output;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show all containers (including stopped).
    #[arg(short, long)]
    pub all: bool,

    /// Print full container ids.
    #[arg(long)]
    pub no_trunc: bool,
}

/// Executes the `ps` command.
///
/// # Errors
///
/// Returns an error if the state file cannot be loaded.
pub fn execute(args: &PsArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::open(config)?;
    let containers: Vec<_> = orchestrator
        .list()?
        .into_iter()
        .filter(|c| args.all || c.is_running())
        .collect();

    if containers.is_empty() {
        println!("No containers found.");
        return Ok(());
    }

    println!(
        "{:<14} {:<16} {:<16} {:<22} {:<9} {:<8} {:<15} {:<20}",
        "CONTAINER ID", "NAME", "IMAGE", "COMMAND", "STATUS", "PID", "IP", "CREATED"
    );
    for c in &containers {
        let id = if args.no_trunc { c.id.as_str() } else { c.id.short() };
        let ip = c
            .network
            .as_ref()
            .and_then(|n| n.ip_address)
            .map_or_else(|| "-".to_string(), |ip| ip.to_string());
        println!(
            "{:<14} {:<16} {:<16} {:<22} {:<9} {:<8} {:<15} {:<20}",
            id,
            output::truncate(&c.name, 16),
            output::truncate(c.image(), 16),
            output::truncate(&output::format_command(c.command()), 22),
            c.status.to_string(),
            c.pid,
            ip,
            c.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
    }

    Ok(())
}
