//! # Sandboxed execution
//!
//! Runs model-suggested shell commands inside a [`Workspace`]. The only
//! confinement is the working directory; privileges, network and resources
//! are not restricted.
//!
//! Every child:
//! - runs with the workspace root as its cwd and stdin closed
//! - leads its own process group, killed on timeout or when the running
//!   future is dropped
//! - has its exit status captured, with signals reported as `128 + signal`

use crate::error::{self, Error, Result};
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// What a finished command reports back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Terminating signal, when the process did not exit normally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Best text to describe a failure: stderr, or stdout when stderr is empty
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }

    pub fn status_line(&self) -> String {
        match self.signal {
            Some(signal) => format!("exit code {} (signal {})", self.exit_code, signal),
            None => format!("exit code {}", self.exit_code),
        }
    }
}

/// Which streams a command result keeps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputPolicy {
    /// stdout on success, stderr only on failure
    Truncated,
    /// both streams always
    #[default]
    Full,
}

impl OutputPolicy {
    pub fn apply(self, mut result: ExecutionResult) -> ExecutionResult {
        if self == OutputPolicy::Truncated {
            if result.succeeded() {
                result.stderr.clear();
            } else {
                result.stdout.clear();
            }
        }
        result
    }
}

/// A process to launch directly (no shell)
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub timeout: Duration,
    /// Human-readable command recorded in the result
    pub label: String,
}

impl ProcessSpec {
    pub fn new(program: impl Into<OsString>, cwd: impl Into<PathBuf>) -> Self {
        let program = program.into();
        Self {
            label: program.to_string_lossy().into_owned(),
            program,
            args: Vec::new(),
            cwd: cwd.into(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Launch a process, wait for it within its timeout, and capture its output
pub async fn run_process(spec: &ProcessSpec) -> Result<ExecutionResult> {
    tracing::debug!(program = ?spec.program, args = ?spec.args, cwd = %spec.cwd.display(), "spawning");

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(|e| {
        let program = spec.program.to_string_lossy().into_owned();
        let err = if e.kind() == std::io::ErrorKind::NotFound {
            Error::tool_unavailable(program).set_source(e)
        } else {
            Error::from(e).with_context("program", program)
        };
        err.with_operation("exec::spawn")
    })?;

    let guard = ProcessGroupGuard { pgid: child.id() };

    match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            guard.disarm();
            let (exit_code, signal) = exit_code(&output.status);
            Ok(ExecutionResult {
                command: spec.label.clone(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code,
                signal,
            })
        }
        Ok(Err(e)) => Err(error::io_at(&spec.cwd, e)
            .with_operation("exec::wait")
            .with_context("command", spec.label.clone())),
        Err(_) => {
            tracing::warn!(command = %spec.label, timeout_secs = spec.timeout.as_secs(), "command timed out");
            Err(Error::execution_timeout(spec.label.clone(), spec.timeout.as_secs()).with_operation("exec::wait"))
        }
    }
}

/// Runs shell commands inside a workspace
#[derive(Debug, Clone)]
pub struct SandboxedExecutor {
    shell: Vec<String>,
    policy: OutputPolicy,
    timeout: Duration,
}

impl Default for SandboxedExecutor {
    fn default() -> Self {
        Self {
            shell: vec!["sh".into(), "-c".into()],
            policy: OutputPolicy::Full,
            timeout: Duration::from_secs(300),
        }
    }
}

impl SandboxedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shell program followed by the flags that precede the command string
    pub fn with_shell(mut self, shell: Vec<String>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_policy(mut self, policy: OutputPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy(&self) -> OutputPolicy {
        self.policy
    }

    /// Run `command` through the shell with `workspace` as the working directory
    pub async fn run(&self, command: &str, workspace: &Workspace) -> Result<ExecutionResult> {
        workspace.ensure()?;

        let (program, flags) = self
            .shell
            .split_first()
            .ok_or_else(|| Error::config_invalid("shell must name a program").with_operation("exec::run"))?;

        let spec = ProcessSpec::new(program, workspace.root())
            .args(flags)
            .arg(command)
            .with_timeout(self.timeout)
            .with_label(command);

        let result = self.policy.apply(run_process(&spec).await?);
        tracing::info!(command, exit_code = result.exit_code, "command finished");
        Ok(result)
    }
}

fn exit_code(status: &ExitStatus) -> (i32, Option<i32>) {
    if let Some(code) = status.code() {
        return (code, None);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return (128 + signal, Some(signal));
        }
    }
    (-1, None)
}

/// Kills the child's process group unless disarmed after a normal exit
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let result = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, error = %err, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}
