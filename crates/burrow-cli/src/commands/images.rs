//! `brw images`: list the local image catalog.

use burrow_common::config::RuntimeConfig;
use burrow_image::ImageStore;
use clap::Args;

use crate::output;

/// Arguments for the `images` command.
#[derive(Args, Debug)]
pub struct ImagesArgs {
    /// Print full image ids.
    #[arg(long)]
    pub no_trunc: bool,
}

/// Executes the `images` command.
///
/// # Errors
///
/// Returns an error if the catalog cannot be read.
pub fn execute(args: &ImagesArgs, config: &RuntimeConfig) -> anyhow::Result<()> {
    let images = ImageStore::open(config)?.list()?;
    if images.is_empty() {
        println!("No images found. Import one with: brw pull <name> --from <source>");
        return Ok(());
    }

    println!(
        "{:<14} {:<24} {:<12} {:<12} {:<25}",
        "IMAGE ID", "REPOSITORY", "TAG", "SIZE", "CREATED"
    );
    for image in &images {
        let id = image.id.as_str();
        let id = if args.no_trunc {
            id
        } else {
            id.get(..12).unwrap_or(id)
        };
        println!(
            "{:<14} {:<24} {:<12} {:<12} {:<25}",
            id,
            image.repository,
            image.tag,
            output::format_bytes(image.size_bytes),
            image.created_at,
        );
    }

    Ok(())
}
