//! Command execution for kernel state changes
//!
//! Every change banset makes to the firewall goes through a [`CommandRunner`]:
//! `ipset` for deny-set membership, `iptables`/`ip6tables` for the chain rules.
//! Production code uses [`SystemRunner`]; tests substitute a recording runner.
//!
//! # Security
//!
//! - Arguments are passed directly without shell interpolation
//! - Binaries are resolved once, by absolute path, when the manager is built
//! - Each invocation can be bounded by a timeout; the child is killed on expiry

use crate::core::error::{Error, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Exit status and captured output of one kernel command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok() -> Self {
        Self {
            exit_code: Some(0),
            ..Self::default()
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Converts a failed output into [`Error::Command`]
    pub fn into_error(self, program: &Path, args: &[String]) -> Error {
        Error::Command {
            command: command_line(program, args),
            stderr: self.stderr.trim().to_string(),
            exit_code: self.exit_code,
        }
    }
}

/// Runs OS binaries on behalf of the protocol contexts
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` and waits for it to exit.
    ///
    /// A non-zero exit is reported through [`CommandOutput`], not as `Err`;
    /// `Err` means the command could not be run at all.
    fn run(
        &self,
        program: &Path,
        args: &[String],
    ) -> impl Future<Output = Result<CommandOutput>> + Send;

    /// Resolves a binary name to an absolute path.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        find_binary(name)
    }
}

/// Spawns real processes with `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds every command by `timeout`; `Duration::ZERO` disables the bound.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: (!timeout.is_zero()).then_some(timeout),
        }
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput> {
        debug!("running {}", command_line(program, args));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let program_name = program.display().to_string();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| Error::Timeout {
                    program: program_name.clone(),
                    timeout: limit,
                })?,
            None => cmd.output().await,
        }
        .map_err(|source| Error::Spawn {
            program: program_name,
            source,
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Searches `PATH` for a regular file called `name`
///
/// # Returns
///
/// The first matching path, or `None` if `name` is not on `PATH`
pub fn find_binary(name: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths).find_map(|dir| {
            let full_path = dir.join(name);
            if full_path.is_file() {
                Some(full_path)
            } else {
                None
            }
        })
    })
}

/// Renders a command for logs and error messages
pub fn command_line(program: &Path, args: &[String]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
