//! External process execution.
//!
//! Every tool the repository drives (git, reprepro, gpg, tar, chroot) is
//! started through a [`CommandRunner`], which returns the exit status and the
//! captured output as a [`ProcessOutput`] instead of failing implicitly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Number of output lines kept in failure messages.
const FAILURE_TAIL_LINES: usize = 10;

/// A command line to run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Fed to the process on stdin, then stdin is closed
    pub stdin: Option<String>,
    pub current_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Run `program` through sudo.
    pub fn sudo(program: impl Into<String>) -> Self {
        Self::new("sudo").arg(program)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Exit status and captured output of a finished process.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Fail with a `BuildFailure` unless the process exited with status 0.
    pub fn check(self, invocation: &Invocation) -> Result<Self> {
        self.check_status(invocation, &[0])
    }

    /// Fail with a `BuildFailure` unless the exit status is one of `expected`.
    pub fn check_status(self, invocation: &Invocation, expected: &[i32]) -> Result<Self> {
        match self.status {
            Some(code) if expected.contains(&code) => Ok(self),
            status => {
                let status = status
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                Err(Error::BuildFailure(format!(
                    "'{}' failed (exit {})\n{}",
                    invocation,
                    status,
                    self.tail(FAILURE_TAIL_LINES)
                )))
            }
        }
    }

    /// The last `count` lines of stdout followed by stderr.
    pub fn tail(&self, count: usize) -> String {
        let lines: Vec<&str> = self.stdout.lines().chain(self.stderr.lines()).collect();
        let start = lines.len().saturating_sub(count);
        lines[start..].join("\n")
    }
}

/// Runs external processes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the process to completion. Errors only when it cannot be started.
    async fn run(&self, invocation: &Invocation) -> anyhow::Result<ProcessOutput>;
}

/// Runs processes with `tokio::process`.
pub struct TokioRunner;

#[async_trait]
impl CommandRunner for TokioRunner {
    #[tracing::instrument(skip(self), fields(command = %invocation))]
    async fn run(&self, invocation: &Invocation) -> anyhow::Result<ProcessOutput> {
        debug!("Running {}", invocation);

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &invocation.current_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start '{}'", invocation))?;

        if let Some(input) = &invocation.stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(input.as_bytes())
                .await
                .with_context(|| format!("Failed to write stdin of '{}'", invocation))?;
        }

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for '{}'", invocation))?;

        debug!("'{}' exited with {:?}", invocation, output.status.code());
        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
