//! CLI command definitions and dispatch.

pub mod images;
pub mod init;
pub mod logs;
pub mod ps;
pub mod pull;
pub mod rm;
pub mod run;
pub mod stop;

use std::path::PathBuf;

use burrow_common::config::RuntimeConfig;
use burrow_common::constants::{DATA_DIR_ENV, SYSTEM_DATA_DIR};
use burrow_common::types::ContainerId;
use burrow_runtime::Orchestrator;
use clap::{Parser, Subcommand};

/// Burrow, a daemon-less container runtime.
#[derive(Parser, Debug)]
#[command(name = "brw", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding images, containers, and the state file.
    #[arg(long, global = true, env = DATA_DIR_ENV, default_value = SYSTEM_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create and start a container.
    Run(run::RunArgs),
    /// List containers.
    Ps(ps::PsArgs),
    /// List local images.
    Images(images::ImagesArgs),
    /// Import an image from a local directory or archive.
    Pull(pull::PullArgs),
    /// Stop running containers.
    Stop(stop::StopArgs),
    /// Remove containers, stopping them first if needed.
    Rm(rm::RmArgs),
    /// Print the output of a detached container.
    Logs(logs::LogsArgs),
    /// Container entry point; not meant to be run by hand.
    #[command(hide = true)]
    Init,
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = RuntimeConfig::with_data_dir(cli.data_dir);
    match cli.command {
        Command::Run(args) => run::execute(args, config),
        Command::Ps(args) => ps::execute(&args, config),
        Command::Images(args) => images::execute(&args, &config),
        Command::Pull(args) => pull::execute(&args, &config),
        Command::Stop(args) => stop::execute(&args, config),
        Command::Rm(args) => rm::execute(&args, config),
        Command::Logs(args) => logs::execute(&args, config),
        Command::Init => init::execute(),
    }
}

/// Applies `action` to each container named in `queries`.
///
/// Every query is attempted; failures are reported on stderr and the
/// command fails at the end if any occurred.
fn for_each_container(
    orchestrator: &Orchestrator,
    queries: &[String],
    (verb, past): (&str, &str),
    action: impl Fn(&ContainerId) -> burrow_common::error::Result<()>,
) -> anyhow::Result<()> {
    let mut failed = 0usize;
    for query in queries {
        match orchestrator.resolve(query).and_then(|id| action(&id)) {
            Ok(()) => println!("{query}"),
            Err(e) => {
                eprintln!("Error: failed to {verb} {query}: {e}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} container(s) could not be {past}", queries.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use burrow_common::types::NetworkMode;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("valid command line")
    }

    #[test]
    fn run_splits_image_from_command() {
        let cli = parse(&["brw", "run", "-d", "--name", "web", "alpine", "echo", "-n", "hi"]);
        let Command::Run(args) = cli.command else {
            unreachable!("expected run");
        };
        assert_eq!(args.image, "alpine");
        assert_eq!(args.command, ["echo", "-n", "hi"]);
        assert_eq!(args.name.as_deref(), Some("web"));
        assert!(args.detach);
        assert_eq!(args.network, NetworkMode::Bridge);
    }

    #[test]
    fn run_rejects_unknown_network_mode() {
        assert!(Cli::try_parse_from(["brw", "run", "--net", "overlay", "alpine"]).is_err());
    }

    #[test]
    fn data_dir_is_a_global_flag() {
        let cli = parse(&["brw", "ps", "--data-dir", "/tmp/burrow-test"]);
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/burrow-test"));
    }

    #[test]
    fn pull_requires_a_source() {
        assert!(Cli::try_parse_from(["brw", "pull", "alpine"]).is_err());
        let cli = parse(&["brw", "pull", "alpine", "--from", "file:///srv/rootfs"]);
        assert!(matches!(cli.command, Command::Pull(_)));
    }

    #[test]
    fn init_is_accepted_but_hidden() {
        assert!(matches!(parse(&["brw", "init"]).command, Command::Init));
        let mut command = <Cli as clap::CommandFactory>::command();
        let help = command.render_help().to_string();
        assert!(!help.contains("init"));
    }
}
