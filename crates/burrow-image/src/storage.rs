//! Local storage backend for images and per-container directories.
//!
//! On-disk layout under the data directory:
//!
//! ```text
//! images/catalog.json
//! images/<repository>/<tag>/rootfs/
//! images/<repository>/<tag>/metadata.json
//! containers/<id>/.rootfs_ready
//! ```
//!
//! Containers run directly on the image rootfs; there is no per-container
//! copy-on-write layer.

use std::path::{Path, PathBuf};

use burrow_common::config::RuntimeConfig;
use burrow_common::constants::ROOTFS_READY_MARKER;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerId, ImageId, Sha256Hash};

use crate::layer::{self, Layer};
use crate::reference::ImageReference;
use crate::registry::{ImageCatalog, ImageEntry};
use crate::source::{self, ImageSource};

const ROOTFS_DIR: &str = "rootfs";
const STAGING_DIR: &str = "rootfs.partial";
const METADATA_FILE: &str = "metadata.json";

/// Supplies root filesystems to the orchestrator.
pub trait ImageProvider: Send + Sync {
    /// Prepares the directory of `container_id` for `image` and returns the
    /// root filesystem path to chroot into.
    ///
    /// # Errors
    ///
    /// Returns `RootfsPreparation` if the image is unknown or unusable.
    fn prepare_rootfs(&self, container_id: &ContainerId, image: &str) -> Result<PathBuf>;
}

/// Manages local storage of images.
#[derive(Debug)]
pub struct ImageStore {
    images_dir: PathBuf,
    containers_dir: PathBuf,
    catalog: ImageCatalog,
}

impl ImageStore {
    /// Opens or initializes the store under the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the images directory cannot be created.
    pub fn open(config: &RuntimeConfig) -> Result<Self> {
        let images_dir = config.images_dir();
        tracing::debug!(path = %images_dir.display(), "opening image store");
        Ok(Self {
            catalog: ImageCatalog::open(&images_dir)?,
            images_dir,
            containers_dir: config.containers_dir(),
        })
    }

    /// Returns the directory holding an image's rootfs and metadata.
    #[must_use]
    pub fn image_dir(&self, reference: &ImageReference) -> PathBuf {
        self.images_dir.join(reference.relative_dir())
    }

    /// Returns the rootfs path of an image.
    #[must_use]
    pub fn rootfs_path(&self, reference: &ImageReference) -> PathBuf {
        self.image_dir(reference).join(ROOTFS_DIR)
    }

    /// Lists imported images.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub fn list(&self) -> Result<Vec<ImageEntry>> {
        self.catalog.list()
    }

    /// Imports a root filesystem from `source_uri` under `reference`.
    ///
    /// A `tar://` source may be checked against `expected` before it is
    /// unpacked. Pulling an existing reference replaces it.
    ///
    /// # Errors
    ///
    /// Returns `Config` for a bad reference or scheme, `NotFound` for a
    /// missing source, `HashMismatch` on checksum failure, and `Io` for
    /// import failures.
    pub fn pull(
        &self,
        reference: &str,
        source_uri: &str,
        expected: Option<&Sha256Hash>,
    ) -> Result<ImageEntry> {
        let reference: ImageReference = reference.parse()?;
        let source = source::resolve_source(source_uri)?;
        match (&source, expected) {
            (ImageSource::Tar(archive), Some(hash)) => crate::hash::validate_hash(archive, hash)?,
            (ImageSource::File(_), Some(_)) => {
                return Err(BurrowError::Config {
                    message: "checksum verification requires a tar:// source".into(),
                });
            }
            (_, None) => {}
        }

        let image_dir = self.image_dir(&reference);
        std::fs::create_dir_all(&image_dir).map_err(|e| BurrowError::io(&image_dir, e))?;
        let staging = image_dir.join(STAGING_DIR);
        remove_tree(&staging)?;

        let imported: Result<Layer> = match &source {
            ImageSource::Tar(archive) => layer::extract_layer(archive, &staging),
            ImageSource::File(dir) => layer::copy_layer(dir, &staging),
        };
        let layer = match imported {
            Ok(layer) => layer,
            Err(e) => {
                if let Err(cleanup) = remove_tree(&staging) {
                    tracing::warn!(error = %cleanup, "failed to remove partial import");
                }
                return Err(e);
            }
        };

        let rootfs = image_dir.join(ROOTFS_DIR);
        if rootfs.exists() {
            tracing::warn!(image = %reference, "replacing existing image rootfs");
            remove_tree(&rootfs)?;
        }
        std::fs::rename(&staging, &rootfs).map_err(|e| BurrowError::io(&rootfs, e))?;

        let hash = layer.hash.as_hex().to_string();
        let entry = ImageEntry {
            id: ImageId::new(hash.clone()),
            repository: reference.repository.clone(),
            tag: reference.tag.clone(),
            source: source.to_string(),
            layers: vec![hash],
            size_bytes: layer.size_bytes,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let metadata = image_dir.join(METADATA_FILE);
        std::fs::write(&metadata, serde_json::to_string_pretty(&entry)?)
            .map_err(|e| BurrowError::io(&metadata, e))?;
        self.catalog.register(entry.clone())?;

        tracing::info!(image = %reference, id = %entry.id, size = entry.size_bytes, "image pulled");
        Ok(entry)
    }

    fn locate(&self, image: &str) -> Result<PathBuf> {
        let reference: ImageReference = image.parse()?;
        if self.catalog.find(&reference)?.is_none() {
            return Err(BurrowError::NotFound {
                kind: "image",
                id: reference.to_string(),
            });
        }
        let rootfs = self.rootfs_path(&reference);
        if !rootfs.is_dir() {
            return Err(BurrowError::NotFound {
                kind: "image rootfs",
                id: rootfs.display().to_string(),
            });
        }
        Ok(rootfs)
    }
}

impl ImageProvider for ImageStore {
    fn prepare_rootfs(&self, container_id: &ContainerId, image: &str) -> Result<PathBuf> {
        let preparation_error = |e: BurrowError| BurrowError::RootfsPreparation {
            image: image.to_string(),
            message: e.to_string(),
        };
        let rootfs = self.locate(image).map_err(preparation_error)?;

        let container_dir = self.containers_dir.join(container_id.as_str());
        std::fs::create_dir_all(&container_dir)
            .map_err(|e| preparation_error(BurrowError::io(&container_dir, e)))?;
        let marker = container_dir.join(ROOTFS_READY_MARKER);
        std::fs::write(&marker, image).map_err(|e| preparation_error(BurrowError::io(&marker, e)))?;

        tracing::debug!(
            container_id = %container_id,
            rootfs = %rootfs.display(),
            "rootfs prepared"
        );
        Ok(rootfs)
    }
}

fn remove_tree(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BurrowError::io(path, e)),
    }
}
