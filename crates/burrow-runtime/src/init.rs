//! The container init: runs inside the new namespaces and becomes the
//! container command.
//!
//! Entered through the hidden `init` subcommand of the same binary. Every
//! step is fatal; on success the process image is replaced and this code
//! never returns.

use std::convert::Infallible;
use std::ffi::CString;
use std::io::Read;
use std::os::fd::FromRawFd;
use std::path::PathBuf;

use burrow_common::error::{BurrowError, Result};
use burrow_core::filesystem::{chroot, mount};
use burrow_core::namespace::uts;

use crate::handoff::InitHandoff;

/// Builds the container from the process environment and executes its
/// command.
///
/// # Errors
///
/// Returns the error of the first failed step. `Ok` is never returned
/// because a successful exec does not come back.
pub fn run() -> Result<Infallible> {
    let handoff = InitHandoff::from_process_env()?;
    tracing::debug!(
        container_id = %handoff.container_id,
        rootfs = %handoff.rootfs.display(),
        "container init starting"
    );

    if let Some(fd) = handoff.start_fd {
        wait_for_start(fd);
    }

    uts::set_hostname(&handoff.name)?;
    mount::setup_container_mounts(&handoff.rootfs, &handoff.volumes)?;
    chroot::enter_root(&handoff.rootfs)?;
    exec(&handoff.argv)
}

/// Blocks until the parent writes to or closes the start gate.
fn wait_for_start(fd: i32) {
    // SAFETY: the launcher hands this descriptor to the init process
    // exclusively and nothing else in this process refers to it.
    let mut gate = unsafe { std::fs::File::from_raw_fd(fd) };
    let mut byte = [0u8; 1];
    if let Err(e) = gate.read(&mut byte) {
        tracing::debug!(fd, error = %e, "start gate unreadable, continuing");
    }
}

/// Resolves `argv[0]` against the container `PATH` and replaces the process.
fn exec(argv: &[String]) -> Result<Infallible> {
    let program = argv.first().map(String::as_str).unwrap_or_default();
    let exec_error = |message: String| BurrowError::Exec {
        program: program.to_string(),
        message,
    };

    let path = resolve_program(program).map_err(|e| exec_error(e.to_string()))?;
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|e| exec_error(e.to_string()))?;
    let c_args = argv
        .iter()
        .map(|a| CString::new(a.as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| exec_error(e.to_string()))?;

    tracing::debug!(path = %path.display(), "executing container command");
    nix::unistd::execv(&c_path, &c_args).map_err(|e| exec_error(e.to_string()))
}

/// Finds the executable for `program`.
///
/// Names containing a slash are taken as paths; bare names are searched in
/// `PATH`.
///
/// # Errors
///
/// Returns an error if nothing executable is found.
pub fn resolve_program(program: &str) -> std::result::Result<PathBuf, which::Error> {
    which::which(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_are_found_in_path() {
        let resolved = resolve_program("sh").expect("sh in PATH");
        assert!(resolved.is_absolute());
    }

    #[test]
    fn absolute_paths_are_checked_for_existence() {
        assert!(resolve_program("/definitely/not/here").is_err());
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("tool");
        std::fs::write(&script, "#!/bin/sh\n").expect("write");
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
                .expect("chmod");
        }
        assert!(resolve_program(script.to_str().unwrap()).is_ok());
    }

    #[test]
    fn run_without_configuration_fails_before_touching_the_system() {
        // The test environment carries no handoff variables.
        if std::env::var_os(crate::handoff::ENV_ROOTFS).is_none() {
            assert!(matches!(
                run(),
                Err(BurrowError::MissingConfiguration { .. })
            ));
        }
    }
}
