//! `brw run`: create and start a container.

use std::sync::Arc;

use anyhow::Context;
use burrow_common::config::RuntimeConfig;
use burrow_common::types::{NetworkMode, ResourceSpec, VolumeMapping};
use burrow_runtime::{ContainerConfig, Orchestrator};
use clap::Args;

const DEFAULT_COMMAND: &str = "/bin/sh";

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Image reference (`repo[:tag]`).
    pub image: String,

    /// Command and arguments to run; defaults to `/bin/sh`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Container name; defaults to the short id.
    #[arg(long)]
    pub name: Option<String>,

    /// Attach the current terminal to the container.
    #[arg(short = 't', long = "tty", visible_alias = "it")]
    pub tty: bool,

    /// Return immediately instead of waiting for the container to exit.
    #[arg(short, long)]
    pub detach: bool,

    /// Network mode: `bridge`, `host`, or `none`.
    #[arg(long = "net", visible_alias = "network", default_value = "bridge")]
    pub network: NetworkMode,

    /// Bind mount `host:container`; may be repeated.
    #[arg(short = 'v', long = "volume")]
    pub volumes: Vec<VolumeMapping>,

    /// Memory ceiling (`512k`, `100m`, `1g`, or bytes).
    #[arg(short, long)]
    pub memory: Option<String>,

    /// CPU cores the container may use (`0-2,4`).
    #[arg(long)]
    pub cpuset: Option<String>,

    /// Relative CPU weight in share units.
    #[arg(long)]
    pub cpu_shares: Option<u64>,
}

impl RunArgs {
    fn into_config(self) -> anyhow::Result<ContainerConfig> {
        let command = if self.command.is_empty() {
            vec![DEFAULT_COMMAND.to_string()]
        } else {
            self.command
        };
        let volumes = self
            .volumes
            .into_iter()
            .map(|v| -> anyhow::Result<VolumeMapping> {
                let host_path = std::path::absolute(&v.host_path)
                    .with_context(|| format!("invalid volume source {}", v.host_path.display()))?;
                Ok(VolumeMapping { host_path, ..v })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(ContainerConfig {
            name: self.name.unwrap_or_default(),
            image: self.image,
            command,
            tty: self.tty,
            detach: self.detach,
            network: Some(self.network),
            volumes,
            resources: ResourceSpec {
                memory: self.memory,
                cpuset: self.cpuset,
                cpu_shares: self.cpu_shares,
            },
        })
    }
}

/// Executes the `run` command.
///
/// Detached containers print their id. Otherwise the command waits for the
/// container, stops it on Ctrl+C, and exits with the container's status.
///
/// # Errors
///
/// Returns an error if the container cannot be created or waited for.
pub fn execute(args: RunArgs, config: RuntimeConfig) -> anyhow::Result<()> {
    if args.tty && args.detach {
        anyhow::bail!("--tty and --detach cannot be combined");
    }
    let detach = args.detach;
    let container = args.into_config()?;
    let orchestrator = Arc::new(Orchestrator::open(config)?);

    let outcome = orchestrator.create(container)?;
    for warning in &outcome.warnings {
        eprintln!("Warning: {warning}");
    }
    if let Some(ip) = outcome.network.as_ref().and_then(|n| n.ip_address) {
        tracing::info!(container_id = %outcome.id, %ip, "container address");
    }

    if detach {
        println!("{}", outcome.id);
        return Ok(());
    }

    let handler_orchestrator = Arc::clone(&orchestrator);
    let id = outcome.id.clone();
    ctrlc::set_handler(move || {
        if let Err(e) = handler_orchestrator.stop(&id) {
            tracing::warn!(container_id = %id, error = %e, "stop on interrupt failed");
        }
    })
    .context("failed to set Ctrl+C handler")?;

    match orchestrator.wait(&outcome.id)? {
        Some(0) | None => Ok(()),
        Some(code) => std::process::exit(code),
    }
}
