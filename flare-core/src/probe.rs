//! Fuzzer status probe
//!
//! Asks an external status tool (`afl-whatsup` by default) about a target's
//! campaign directory and returns its raw output.

use crate::config::FuzzConfig;
use crate::error::{Error, Result};
use crate::exec::{run_process, ProcessSpec};
use crate::triage::FuzzTarget;
use crate::workspace::Workspace;
use std::time::Duration;

const CAMPAIGN_PLACEHOLDER: &str = "{campaign}";

#[derive(Debug, Clone)]
pub struct FuzzStatusProbe {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl FuzzStatusProbe {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(config: &FuzzConfig) -> Self {
        Self::new(config.status_tool.clone(), config.status_args.clone()).with_timeout(config.status_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Status text for `target`, or an error carrying the tool's diagnostics
    pub async fn status(&self, target: &FuzzTarget, workspace: &Workspace) -> Result<String> {
        workspace.ensure()?;

        let campaign = target.campaign_dir.to_string_lossy();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(CAMPAIGN_PLACEHOLDER, &campaign))
            .collect();
        let label = std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        let spec = ProcessSpec::new(&self.program, workspace.root())
            .args(&args)
            .with_timeout(self.timeout)
            .with_label(label);
        let result = run_process(&spec).await.map_err(|e| e.with_context("target", target.name.clone()))?;

        if !result.succeeded() {
            return Err(
                Error::execution_failure(result.command.clone(), result.exit_code, result.error_text().trim())
                    .with_operation("probe::status")
                    .with_context("target", target.name.clone()),
            );
        }
        tracing::debug!(target = %target.name, "status probe succeeded");
        Ok(result.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn fixture() -> (tempfile::TempDir, FuzzTarget, Workspace) {
        let tmp = tempfile::tempdir().unwrap();
        let config = FuzzConfig {
            root: tmp.path().join("fuzz"),
            ..Default::default()
        };
        let target = FuzzTarget::locate("png", &config).unwrap();
        let workspace = Workspace::open(tmp.path().join("ws")).unwrap();
        (tmp, target, workspace)
    }

    #[tokio::test]
    async fn test_substitutes_campaign_dir() {
        let (_tmp, target, workspace) = fixture();
        let probe = FuzzStatusProbe::new("echo", vec!["-s".into(), "{campaign}".into()]);

        let status = probe.status(&target, &workspace).await.unwrap();
        assert_eq!(status, format!("-s {}\n", target.campaign_dir.display()));
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_diagnostics() {
        let (_tmp, target, workspace) = fixture();
        let probe = FuzzStatusProbe::new(
            "sh",
            vec!["-c".into(), "echo 'no fuzzers running' >&2; exit 1".into()],
        );

        let err = probe.status(&target, &workspace).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailure);
        assert_eq!(err.message(), "no fuzzers running");
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let (_tmp, target, workspace) = fixture();
        let probe = FuzzStatusProbe::new("flare-no-such-status-tool", vec![]);

        let err = probe.status(&target, &workspace).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolUnavailable);
    }

    #[tokio::test]
    async fn test_timeout() {
        let (_tmp, target, workspace) = fixture();
        let probe = FuzzStatusProbe::new("sleep", vec!["5".into()]).with_timeout(Duration::from_millis(100));

        let err = probe.status(&target, &workspace).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionTimeout);
    }
}
