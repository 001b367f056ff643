//! Local image catalog management.
//!
//! Maintains an index of imported images in `images/catalog.json`.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::ImageId;
use serde::{Deserialize, Serialize};

use crate::reference::ImageReference;

const CATALOG_FILE: &str = "catalog.json";

/// Entry in the local image catalog, also stored as `metadata.json` next
/// to the image rootfs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Content hash of the imported root filesystem.
    pub id: ImageId,
    /// Repository name.
    pub repository: String,
    /// Tag.
    pub tag: String,
    /// Source URI this image was imported from.
    pub source: String,
    /// Layer hashes, bottom to top.
    pub layers: Vec<String>,
    /// Unpacked size in bytes.
    pub size_bytes: u64,
    /// Import timestamp (RFC 3339).
    pub created_at: String,
}

impl ImageEntry {
    /// Returns the `repository:tag` form of this entry.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    fn matches(&self, reference: &ImageReference) -> bool {
        self.repository == reference.repository && self.tag == reference.tag
    }
}

/// Image catalog backed by a JSON file.
#[derive(Debug)]
pub struct ImageCatalog {
    catalog_path: PathBuf,
}

impl ImageCatalog {
    /// Opens or creates an image catalog in the given images directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(images_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(images_dir).map_err(|e| BurrowError::io(images_dir, e))?;
        Ok(Self {
            catalog_path: images_dir.join(CATALOG_FILE),
        })
    }

    /// Lists all images in the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog file cannot be read or parsed.
    pub fn list(&self) -> Result<Vec<ImageEntry>> {
        if !self.catalog_path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.catalog_path)
            .map_err(|e| BurrowError::io(&self.catalog_path, e))?;
        let entries: Vec<ImageEntry> = serde_json::from_str(&content)?;
        Ok(entries)
    }

    /// Looks up an image by reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub fn find(&self, reference: &ImageReference) -> Result<Option<ImageEntry>> {
        Ok(self.list()?.into_iter().find(|e| e.matches(reference)))
    }

    /// Registers an image, replacing any entry with the same reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or written.
    pub fn register(&self, entry: ImageEntry) -> Result<()> {
        let mut entries = self.list()?;
        entries.retain(|e| e.repository != entry.repository || e.tag != entry.tag);
        entries.push(entry);
        self.write_entries(&entries)
    }

    fn write_entries(&self, entries: &[ImageEntry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.catalog_path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| BurrowError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.catalog_path)
            .map_err(|e| BurrowError::io(&self.catalog_path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(id: &str, repository: &str, tag: &str) -> ImageEntry {
        ImageEntry {
            id: ImageId::new(id),
            repository: repository.into(),
            tag: tag.into(),
            source: format!("file:///opt/images/{repository}"),
            layers: vec![id.into()],
            size_bytes: 1024,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn catalog_empty_on_first_open() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let catalog = ImageCatalog::open(dir.path()).expect("open failed");
        assert!(catalog.list().expect("list failed").is_empty());
    }

    #[test]
    fn catalog_register_and_find() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let catalog = ImageCatalog::open(dir.path()).expect("open failed");

        catalog
            .register(make_entry("img-1", "alpine", "latest"))
            .expect("register failed");
        catalog
            .register(make_entry("img-2", "debian", "12"))
            .expect("register failed");

        assert_eq!(catalog.list().expect("list failed").len(), 2);
        let found = catalog
            .find(&"alpine".parse().expect("reference"))
            .expect("find failed")
            .expect("entry");
        assert_eq!(found.reference(), "alpine:latest");
        assert!(catalog
            .find(&"alpine:edge".parse().expect("reference"))
            .expect("find failed")
            .is_none());
    }

    #[test]
    fn registering_same_reference_replaces_entry() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let catalog = ImageCatalog::open(dir.path()).expect("open failed");

        catalog
            .register(make_entry("old", "alpine", "latest"))
            .expect("register failed");
        catalog
            .register(make_entry("new", "alpine", "latest"))
            .expect("register failed");

        let entries = catalog.list().expect("list failed");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id.as_str(), "new");
    }
}
