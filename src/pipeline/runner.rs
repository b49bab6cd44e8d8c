//! External process execution for compiler and bibliography passes.
//!
//! The driver never touches `tokio::process` directly; it goes through
//! [`ProcessRunner`] so tests can script exit codes, produce or withhold the
//! PDF, and simulate hangs without a TeX installation.

use crate::pipeline::plan::Invocation;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// What a finished (or abandoned) process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal or after a timeout.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, undecodable bytes replaced.
    pub output: String,
    /// `true` when the bounded wait expired and the process was killed.
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// `run_external_process(command, cwd)` with captured output and a bound on
/// wall-clock time.
pub trait ProcessRunner: Send + Sync {
    /// Run `invocation` with `cwd` as working directory.
    ///
    /// `Err` means the process could not be started or awaited at all; a
    /// process that ran and failed is `Ok` with a non-zero exit code.
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        cwd: &'a Path,
        limit: Duration,
    ) -> BoxFuture<'a, io::Result<ProcessOutput>>;
}

/// Runner that spawns real subprocesses via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        cwd: &'a Path,
        limit: Duration,
    ) -> BoxFuture<'a, io::Result<ProcessOutput>> {
        async move {
            let child = Command::new(&invocation.program)
                .args(&invocation.args)
                .current_dir(cwd)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;

            // Dropping the wait future on timeout drops the child, and
            // `kill_on_drop` takes the process down with it.
            match timeout(limit, child.wait_with_output()).await {
                Ok(result) => {
                    let output = result?;
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let combined = if stderr.is_empty() {
                        stdout.into_owned()
                    } else {
                        format!("{stdout}\n{stderr}")
                    };
                    debug!(
                        "{} exited with {:?}:\n{}",
                        invocation.program,
                        output.status.code(),
                        combined
                    );
                    Ok(ProcessOutput {
                        exit_code: output.status.code(),
                        output: combined,
                        timed_out: false,
                    })
                }
                Err(_) => {
                    warn!(
                        "'{}' timed out after {}s",
                        invocation.command_line(),
                        limit.as_secs()
                    );
                    Ok(ProcessOutput {
                        exit_code: None,
                        output: String::new(),
                        timed_out: true,
                    })
                }
            }
        }
        .boxed()
    }
}
