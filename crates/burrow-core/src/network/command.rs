//! Execution of host networking tools (`ip`, `nsenter`, `iptables`, `sysctl`).
//!
//! Network setup shells out to the standard tools instead of speaking
//! netlink directly. The [`CommandRunner`] trait is the seam that lets the
//! provisioner run against a scripted fake.

use burrow_common::error::{BurrowError, Result};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the command exited with status zero.
    pub success: bool,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns whether the failure reports an object that already exists.
    #[must_use]
    pub fn already_exists(&self) -> bool {
        let err = self.stderr.to_ascii_lowercase();
        err.contains("file exists") || err.contains("already exists") || err.contains("already assigned")
    }
}

/// Runs an external program to completion.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and captures its output.
    ///
    /// A non-zero exit status is reported through [`CommandOutput::success`],
    /// not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be started at all.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Runner that executes programs on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let path = which::which(program).map_err(|e| BurrowError::NetworkSetup {
            message: format!("{program} not found in PATH: {e}"),
        })?;
        tracing::trace!(program, ?args, "running");
        let output = std::process::Command::new(&path)
            .args(args)
            .output()
            .map_err(|e| BurrowError::io(path, e))?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Runs a command and turns a non-zero exit into `NetworkSetup`.
pub(crate) fn run_checked(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> Result<String> {
    let out = runner.run(program, args)?;
    if out.success {
        Ok(out.stdout)
    } else {
        Err(failure(program, args, &out))
    }
}

/// Like [`run_checked`], but treats "already exists" failures as success.
pub(crate) fn run_idempotent(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> Result<()> {
    let out = runner.run(program, args)?;
    if out.success || out.already_exists() {
        Ok(())
    } else {
        Err(failure(program, args, &out))
    }
}

pub(crate) fn failure(program: &str, args: &[&str], out: &CommandOutput) -> BurrowError {
    BurrowError::NetworkSetup {
        message: format!("`{program} {}` failed: {}", args.join(" "), out.stderr.trim()),
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted in-memory stand-in for the host networking tools.

    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::{CommandOutput, CommandRunner};
    use burrow_common::error::Result;

    /// Simulates link and rule state so idempotence can be observed.
    #[derive(Debug, Default)]
    pub struct FakeRunner {
        pub calls: Mutex<Vec<String>>,
        pub links: Mutex<HashSet<String>>,
        pub rules: Mutex<HashSet<String>>,
        pub fail_on: Mutex<Option<String>>,
    }

    impl FakeRunner {
        pub fn failing_on(fragment: &str) -> Self {
            let fake = Self::default();
            *fake.fail_on.lock().unwrap() = Some(fragment.to_string());
            fake
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, fragment: &str) -> usize {
            self.calls().iter().filter(|c| c.contains(fragment)).count()
        }

        fn ok() -> CommandOutput {
            CommandOutput {
                success: true,
                ..CommandOutput::default()
            }
        }

        fn err(msg: &str) -> CommandOutput {
            CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: msg.to_string(),
            }
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
            let line = format!("{program} {}", args.join(" "));
            self.calls.lock().unwrap().push(line.clone());
            if let Some(fragment) = self.fail_on.lock().unwrap().as_deref() {
                if line.contains(fragment) {
                    return Ok(Self::err("RTNETLINK answers: Operation not permitted"));
                }
            }
            let out = match (program, args) {
                ("ip", ["link", "show", name]) => {
                    if self.links.lock().unwrap().contains(*name) {
                        Self::ok()
                    } else {
                        Self::err("Device does not exist")
                    }
                }
                ("ip", ["link", "add", "name", name, "type", "bridge"]) => {
                    if self.links.lock().unwrap().insert((*name).to_string()) {
                        Self::ok()
                    } else {
                        Self::err("RTNETLINK answers: File exists")
                    }
                }
                ("ip", ["link", "add", host, "type", "veth", "peer", "name", _]) => {
                    if self.links.lock().unwrap().insert((*host).to_string()) {
                        Self::ok()
                    } else {
                        Self::err("RTNETLINK answers: File exists")
                    }
                }
                ("ip", ["link", "delete", name]) => {
                    if self.links.lock().unwrap().remove(*name) {
                        Self::ok()
                    } else {
                        Self::err("Cannot find device")
                    }
                }
                ("iptables", ["-t", "nat", "-C", rest @ ..]) => {
                    if self.rules.lock().unwrap().contains(&rest.join(" ")) {
                        Self::ok()
                    } else {
                        Self::err("Bad rule")
                    }
                }
                ("iptables", ["-t", "nat", "-A", rest @ ..]) => {
                    let _ = self.rules.lock().unwrap().insert(rest.join(" "));
                    Self::ok()
                }
                _ => Self::ok(),
            };
            Ok(out)
        }
    }
}
