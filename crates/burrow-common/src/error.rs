//! Unified error types for the Burrow workspace.
//!
//! The variants follow the lifecycle they occur in: registry lookups,
//! pre-spawn preparation, post-spawn side effects, and failures inside
//! the container init process.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A container with the requested name is already registered.
    #[error("a container named {name} already exists")]
    DuplicateName {
        /// The colliding name.
        name: String,
    },

    /// The image provider could not produce a root filesystem.
    #[error("failed to prepare rootfs for image {image}: {message}")]
    RootfsPreparation {
        /// Image reference that was requested.
        image: String,
        /// Description of the failure.
        message: String,
    },

    /// The isolated container process could not be spawned.
    #[error("failed to start container process: {message}")]
    ProcessStart {
        /// Description of the failure.
        message: String,
    },

    /// A tracked process id no longer resolves to a live process.
    #[error("process {pid} could not be signaled: {message}")]
    ProcessLookup {
        /// The tracked process id.
        pid: u32,
        /// Description of the failure.
        message: String,
    },

    /// Control-group limits could not be applied.
    #[error("failed to apply resource limits: {message}")]
    ResourceLimit {
        /// Description of the failure.
        message: String,
    },

    /// A memory size string could not be parsed.
    #[error("invalid memory limit: {value:?}")]
    InvalidMemorySpec {
        /// The rejected input.
        value: String,
    },

    /// Network provisioning failed.
    #[error("network setup failed: {message}")]
    NetworkSetup {
        /// Description of the failure.
        message: String,
    },

    /// A namespace-scoped setting such as the hostname could not be applied.
    #[error("namespace setup failed: {message}")]
    Namespace {
        /// Description of the failure.
        message: String,
    },

    /// The init handoff environment lacks a required variable.
    #[error("missing container configuration: {variable}")]
    MissingConfiguration {
        /// Name of the missing environment variable.
        variable: &'static str,
    },

    /// A mount or device-node operation inside the container failed.
    #[error("mount of {target} failed: {message}")]
    Mount {
        /// Mount target path.
        target: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Changing the filesystem root failed.
    #[error("chroot into {path} failed: {message}")]
    Chroot {
        /// Intended new root.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// The container command could not be resolved or executed.
    #[error("cannot execute {program}: {message}")]
    Exec {
        /// Program name from the argument vector.
        program: String,
        /// Description of the failure.
        message: String,
    },

    /// A hash validation failed.
    #[error("hash mismatch for {resource}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Resource that failed validation.
        resource: String,
        /// Expected hash value.
        expected: String,
        /// Actual computed hash value.
        actual: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BurrowError {
    /// Builds an [`BurrowError::Io`] from a path and an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BurrowError>;
