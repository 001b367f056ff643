//! # burrow-image
//!
//! Image provider for the Burrow runtime.
//!
//! Handles:
//! - **Sources**: `file://` directories and `tar://` archives.
//! - **Layers**: archive extraction and directory tree import.
//! - **Hashing**: SHA-256 image ids and archive verification.
//! - **Registry**: the local image catalog and `repo[:tag]` references.
//! - **Storage**: on-disk image layout and per-container rootfs preparation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod hash;
pub mod layer;
pub mod reference;
pub mod registry;
pub mod source;
pub mod storage;

pub use reference::ImageReference;
pub use storage::{ImageProvider, ImageStore};
