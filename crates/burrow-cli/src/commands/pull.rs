//! `brw pull`: import an image into the local store.

use anyhow::Context;
use burrow_common::config::RuntimeConfig;
use burrow_common::types::Sha256Hash;
use burrow_image::ImageStore;
use clap::Args;

use crate::output;

/// Arguments for the `pull` command.
#[derive(Args, Debug)]
pub struct PullArgs {
    /// Image reference to register (`repo[:tag]`).
    pub reference: String,

    /// Source of the root filesystem: `file://<dir>` or `tar://<archive>`.
    #[arg(long)]
    pub from: String,

    /// Expected SHA-256 of a `tar://` archive.
    #[arg(long)]
    pub sha256: Option<String>,
}

/// Executes the `pull` command.
///
/// # Errors
///
/// Returns an error if the source is invalid, the checksum does not match,
/// or the import fails.
pub fn execute(args: &PullArgs, config: &RuntimeConfig) -> anyhow::Result<()> {
    let expected = args
        .sha256
        .as_deref()
        .map(Sha256Hash::from_hex)
        .transpose()
        .context("invalid --sha256 value")?;
    let store = ImageStore::open(config)?;

    eprintln!("Pulling {} from {}", args.reference, args.from);
    let entry = store
        .pull(&args.reference, &args.from, expected.as_ref())
        .with_context(|| format!("failed to pull {}", args.reference))?;
    println!(
        "{} {} ({})",
        entry.reference(),
        entry.id,
        output::format_bytes(entry.size_bytes)
    );
    Ok(())
}
