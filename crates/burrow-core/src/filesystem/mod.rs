//! Filesystem setup for container isolation.
//!
//! Provides the pseudo-filesystem mounts, bind mounts for volumes, and the
//! `chroot` switch performed by the container init process.

pub mod chroot;
pub mod mount;
