//! Process spawning inside isolated namespaces, and signal/wait helpers.
//!
//! The launcher clones a child directly into new namespaces and re-executes
//! the current binary with the hidden `init` argument and the handoff
//! environment. The child blocks on a start gate until the parent has
//! applied resource limits and networking.

use std::ffi::CString;
use std::fs::File;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burrow_common::constants::INIT_ARG;
use burrow_common::error::{BurrowError, Result};
use burrow_core::namespace::NamespaceConfig;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::handoff::InitHandoff;

/// Descriptor number of the start gate inside the init process.
pub const START_FD: i32 = 3;

const SELF_EXE: &str = "/proc/self/exe";
const STACK_SIZE: usize = 1024 * 1024;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const ABORT_GRACE: Duration = Duration::from_secs(1);

/// Everything needed to start one container process.
#[derive(Debug, Clone)]
pub struct LaunchRequest<'a> {
    /// Configuration for the init process.
    pub handoff: &'a InitHandoff,
    /// Namespaces to create.
    pub namespaces: NamespaceConfig,
    /// Inherit the caller's terminal instead of logging to `log_path`.
    pub tty: bool,
    /// Destination of stdout and stderr when `tty` is off.
    pub log_path: &'a Path,
}

/// A started process, optionally held at its start gate.
#[derive(Debug)]
pub struct SpawnedProcess {
    /// Host pid.
    pub pid: u32,
    gate: Option<File>,
}

impl SpawnedProcess {
    /// A process that runs without waiting for the parent.
    #[must_use]
    pub const fn new(pid: u32) -> Self {
        Self { pid, gate: None }
    }

    /// A process that waits until [`SpawnedProcess::release`] is called.
    #[must_use]
    pub const fn gated(pid: u32, gate: File) -> Self {
        Self {
            pid,
            gate: Some(gate),
        }
    }

    /// Kills a process that was never released and collects it.
    ///
    /// The kill happens before the gate closes, so the container command
    /// never runs.
    pub fn abort(self) {
        if let Ok(target) = to_pid(self.pid) {
            if let Err(e) = kill(target, Signal::SIGKILL) {
                tracing::debug!(pid = self.pid, error = %e, "abort signal not delivered");
            }
        }
        if !wait_exited(self.pid, ABORT_GRACE) {
            tracing::warn!(pid = self.pid, "aborted process did not exit");
        }
        tracing::debug!(pid = self.pid, "container process aborted");
    }

    /// Lets the process continue. Dropping without releasing also opens
    /// the gate because the read end sees end-of-file.
    pub fn release(self) {
        if let Some(mut gate) = self.gate {
            if let Err(e) = gate.write_all(b"1") {
                tracing::debug!(pid = self.pid, error = %e, "start gate already closed");
            }
        }
    }
}

/// Starts container processes.
pub trait ProcessLauncher: Send + Sync {
    /// Spawns the process described by `request` and returns its pid.
    ///
    /// # Errors
    ///
    /// Returns `ProcessStart` if the process cannot be created.
    fn launch(&self, request: &LaunchRequest<'_>) -> Result<SpawnedProcess>;
}

/// Launcher that clones into new namespaces and re-executes this binary.
#[derive(Debug, Clone)]
pub struct NamespaceLauncher {
    executable: PathBuf,
}

impl NamespaceLauncher {
    /// Creates a launcher that executes `executable init`.
    #[must_use]
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }
}

impl Default for NamespaceLauncher {
    /// Re-executes the running binary.
    fn default() -> Self {
        Self::with_executable(SELF_EXE)
    }
}

impl ProcessLauncher for NamespaceLauncher {
    fn launch(&self, request: &LaunchRequest<'_>) -> Result<SpawnedProcess> {
        let start_error = |message: String| BurrowError::ProcessStart { message };

        let handoff = InitHandoff {
            start_fd: Some(START_FD),
            ..request.handoff.clone()
        };
        let env = handoff
            .to_env()?
            .into_iter()
            .map(|(key, value)| {
                let mut entry = key.into_vec();
                entry.push(b'=');
                entry.extend(value.into_vec());
                CString::new(entry)
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| start_error(format!("invalid environment: {e}")))?;
        let exe = CString::new(self.executable.as_os_str().as_encoded_bytes())
            .map_err(|e| start_error(e.to_string()))?;
        let args = [exe.clone(), CString::new(INIT_ARG).map_err(|e| start_error(e.to_string()))?];

        let (gate_read, gate_write) = nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
            .map_err(|e| start_error(format!("pipe: {e}")))?;
        let stdio = if request.tty {
            None
        } else {
            Some(open_stdio(request.log_path)?)
        };

        let gate_fd = gate_read.as_raw_fd();
        let stdio_fds = stdio
            .as_ref()
            .map(|(null, log)| (null.as_raw_fd(), log.as_raw_fd()));
        let mut stack = vec![0u8; STACK_SIZE];

        // Only async-signal-safe calls happen in the child before exec.
        let child = Box::new(|| {
            // SAFETY: dup2/fcntl on descriptors owned by this process image;
            // every buffer used below was allocated before the clone.
            unsafe {
                if let Some((null, log)) = stdio_fds {
                    if libc::dup2(null, 0) < 0 || libc::dup2(log, 1) < 0 || libc::dup2(log, 2) < 0 {
                        return 126;
                    }
                }
                if libc::dup2(gate_fd, START_FD) < 0 || libc::fcntl(START_FD, libc::F_SETFD, 0) < 0 {
                    return 126;
                }
            }
            let _ = nix::unistd::execve(&exe, &args, &env);
            127
        });

        // SAFETY: the child gets its own copy of the address space (no
        // CLONE_VM) and only runs the callback above, which execs or exits.
        let pid = unsafe {
            nix::sched::clone(
                child,
                &mut stack,
                request.namespaces.clone_flags(),
                Some(libc::SIGCHLD),
            )
        }
        .map_err(|e| start_error(format!("clone: {e}")))?;
        drop(gate_read);

        let pid = u32::try_from(pid.as_raw()).map_err(|e| start_error(e.to_string()))?;
        tracing::info!(
            pid,
            container_id = %request.handoff.container_id,
            "container process spawned"
        );
        Ok(SpawnedProcess::gated(pid, File::from(gate_write)))
    }
}

fn open_stdio(log_path: &Path) -> Result<(File, File)> {
    let null = File::open("/dev/null").map_err(|e| BurrowError::io("/dev/null", e))?;
    let log = crate::logs::open_log(log_path)?;
    Ok((null, log))
}

fn to_pid(pid: u32) -> Result<Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Ok(Pid::from_raw(raw)),
        _ => Err(BurrowError::ProcessLookup {
            pid,
            message: "not a valid process id".into(),
        }),
    }
}

/// Sends `SIGTERM`, falling back to `SIGKILL` if delivery fails.
///
/// Does not wait for the process to exit. A container init is PID 1 of its
/// namespace, and the kernel drops `SIGTERM` from outside the namespace
/// unless the program installed a handler for it; [`ensure_exited`]
/// covers that case.
///
/// # Errors
///
/// Returns `ProcessLookup` if neither signal can be delivered.
pub fn terminate(pid: u32) -> Result<()> {
    let target = to_pid(pid)?;
    match kill(target, Signal::SIGTERM) {
        Ok(()) => {
            tracing::info!(pid, "sent SIGTERM");
            Ok(())
        }
        Err(term_err) => {
            tracing::warn!(pid, error = %term_err, "SIGTERM failed, sending SIGKILL");
            kill(target, Signal::SIGKILL).map_err(|e| BurrowError::ProcessLookup {
                pid,
                message: e.to_string(),
            })?;
            tracing::info!(pid, "sent SIGKILL");
            Ok(())
        }
    }
}

/// Returns whether `pid` refers to an existing process (zombies included).
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    to_pid(pid).is_ok_and(|target| !matches!(kill(target, None), Err(Errno::ESRCH)))
}

/// Blocks until `pid` terminates.
///
/// Returns the exit code, or `128 + signal` for a signal death. When `pid`
/// is not a child of this process its status cannot be collected; the call
/// then polls until the process disappears and returns `None`.
///
/// # Errors
///
/// Returns `ProcessLookup` if `pid` is invalid or waiting fails.
pub fn wait_for_exit(pid: u32) -> Result<Option<i32>> {
    let target = to_pid(pid)?;
    loop {
        match waitpid(target, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(Some(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(Some(128 + signal as i32)),
            Ok(_) | Err(Errno::EINTR) => {}
            Err(Errno::ECHILD) => {
                while is_alive(pid) {
                    std::thread::sleep(EXIT_POLL_INTERVAL);
                }
                return Ok(None);
            }
            Err(e) => {
                return Err(BurrowError::ProcessLookup {
                    pid,
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Waits up to `grace` for `pid` to exit, collecting it if it is a child.
///
/// Returns whether the process is gone.
#[must_use]
pub fn wait_exited(pid: u32, grace: Duration) -> bool {
    let Ok(target) = to_pid(pid) else {
        return true;
    };
    let deadline = Instant::now() + grace;
    loop {
        match waitpid(target, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) => return true,
            Err(Errno::ECHILD) if !is_alive(pid) => return true,
            _ => {}
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
    }
}

/// Makes sure `pid` has exited after it was asked to terminate.
///
/// Waits up to `grace`, then sends `SIGKILL` and waits up to `grace` again.
///
/// # Errors
///
/// Returns `ProcessLookup` if `SIGKILL` cannot be delivered or the process
/// outlives it.
pub fn ensure_exited(pid: u32, grace: Duration) -> Result<()> {
    if wait_exited(pid, grace) {
        return Ok(());
    }
    let target = to_pid(pid)?;
    tracing::warn!(pid, "process still running, sending SIGKILL");
    match kill(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            return Err(BurrowError::ProcessLookup {
                pid,
                message: e.to_string(),
            });
        }
    }
    if wait_exited(pid, grace) {
        Ok(())
    } else {
        Err(BurrowError::ProcessLookup {
            pid,
            message: "still running after SIGKILL".into(),
        })
    }
}

/// Collects the exit status of `pid` if it is an exited child.
///
/// Returns whether `pid` is a child of this process that is still running.
pub fn try_reap(pid: u32) -> bool {
    to_pid(pid).is_ok_and(|target| {
        matches!(
            waitpid(target, Some(WaitPidFlag::WNOHANG)),
            Ok(WaitStatus::StillAlive)
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(script: &str) -> u32 {
        std::process::Command::new("sh")
            .args(["-c", script])
            .spawn()
            .expect("spawn")
            .id()
    }

    #[test]
    fn wait_reports_exit_code() {
        let pid = spawn("exit 7");
        assert_eq!(wait_for_exit(pid).unwrap(), Some(7));
        assert!(!is_alive(pid));
    }

    #[test]
    fn terminate_then_wait_reports_signal() {
        let pid = spawn("exec sleep 30");
        assert!(is_alive(pid));
        terminate(pid).unwrap();
        assert_eq!(wait_for_exit(pid).unwrap(), Some(128 + 15));
    }

    #[test]
    fn pid_zero_is_never_signaled() {
        assert!(matches!(
            terminate(0),
            Err(BurrowError::ProcessLookup { pid: 0, .. })
        ));
        assert!(!is_alive(0));
    }

    #[test]
    fn ensure_exited_kills_a_process_ignoring_sigterm() {
        let pid = spawn("trap '' TERM; while :; do sleep 1; done");
        std::thread::sleep(Duration::from_millis(200));
        terminate(pid).unwrap();
        assert!(!wait_exited(pid, Duration::from_millis(300)));
        ensure_exited(pid, Duration::from_secs(2)).unwrap();
        assert!(!is_alive(pid));
    }

    #[test]
    fn wait_exited_collects_a_finished_child() {
        let pid = spawn("exit 0");
        assert!(wait_exited(pid, Duration::from_secs(5)));
        assert!(!is_alive(pid));
    }

    #[test]
    fn try_reap_tells_running_children_apart() {
        let running = spawn("exec sleep 30");
        assert!(try_reap(running));
        let finished = spawn("exit 0");
        assert!(wait_exited(finished, Duration::from_secs(5)));
        assert!(!try_reap(finished));
        assert!(!try_reap(1));
        terminate(running).unwrap();
        assert_eq!(wait_for_exit(running).unwrap(), Some(128 + 15));
    }

    #[test]
    fn aborting_kills_and_collects_the_process() {
        let pid = spawn("exec sleep 30");
        SpawnedProcess::new(pid).abort();
        assert!(!is_alive(pid));
    }

    #[test]
    fn releasing_without_gate_is_harmless() {
        SpawnedProcess::new(1).release();
    }
}
