//! Linux namespace selection for container processes.
//!
//! The orchestrator creates every namespace at spawn time through
//! `clone(2)`; nothing here unshares the calling process.

pub mod uts;

use nix::sched::CloneFlags;

/// Which namespaces a new container process receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Isolate the hostname.
    pub uts: bool,
    /// Isolate the process id space.
    pub pid: bool,
    /// Isolate the mount table.
    pub mount: bool,
    /// Isolate the network stack.
    pub network: bool,
}

impl NamespaceConfig {
    /// Full isolation, optionally sharing the host network stack.
    #[must_use]
    pub const fn isolated(network: bool) -> Self {
        Self {
            uts: true,
            pid: true,
            mount: true,
            network,
        }
    }

    /// Converts the selection into `clone(2)` flags.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        flags.set(CloneFlags::CLONE_NEWUTS, self.uts);
        flags.set(CloneFlags::CLONE_NEWPID, self.pid);
        flags.set(CloneFlags::CLONE_NEWNS, self.mount);
        flags.set(CloneFlags::CLONE_NEWNET, self.network);
        flags
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self::isolated(true)
    }
}
