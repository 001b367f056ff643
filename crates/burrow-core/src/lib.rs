//! # burrow-core
//!
//! Low-level Linux isolation primitives for the Burrow runtime.
//!
//! This crate provides safe abstractions over:
//! - **Cgroups**: memory, cpuset, and CPU weight limits (v1 and v2 hierarchies).
//! - **Namespaces**: clone flags and the container hostname.
//! - **Filesystem**: pseudo-filesystem mounts, bind mounts, and `chroot`.
//! - **Network**: the shared bridge, veth pairs, NAT, and address allocation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
pub mod network;
