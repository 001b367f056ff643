//! # burrow-runtime
//!
//! Container lifecycle for the Burrow runtime.
//!
//! Handles:
//! - **Orchestration**: create, stop, remove, wait, and list containers.
//! - **Registry & state**: the in-memory index and its JSON file on disk.
//! - **Processes**: cloning into namespaces and the in-container init.
//! - **Logs**: captured output of detached containers.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod handoff;
pub mod init;
pub mod logs;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod state;

pub use container::{ContainerConfig, ContainerRecord};
pub use orchestrator::{CreateOutcome, CreateWarning, Orchestrator, OrchestratorBuilder};
