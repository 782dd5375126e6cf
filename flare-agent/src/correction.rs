//! Self-correction loop - run a batch, ask for one fix on the first failure

use flare_core::{Advisory, CommandBlock, ExecutionResult, Relay, SandboxedExecutor, Workspace};
use serde::{Deserialize, Serialize};

/// Message sent to the relay when a command fails
pub fn correction_prompt(command: &str, error: &str) -> String {
    format!("The command {} failed with error: {}. Fix it.", command, error)
}

/// The command that stopped a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub command: String,
    pub ordinal: usize,
    /// Captured error output, or the executor error when the command never finished
    pub error: String,
    /// `None` when the executor itself failed (timeout, spawn error)
    pub exit_code: Option<i32>,
}

/// Result of one pass of the loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionOutcome {
    /// Results in execution order, the failing command included
    pub executed: Vec<ExecutionResult>,
    pub failure: Option<BatchFailure>,
    /// Corrective advice; present whenever `failure` is
    pub suggestion: Option<Advisory>,
    /// Commands left unexecuted after the failure
    pub skipped: usize,
}

impl CorrectionOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug)]
enum LoopState {
    Init,
    Executing,
    Failed(BatchFailure),
    Correcting(BatchFailure),
    Done,
}

/// Executes command blocks in ordinal order; one-shot and advisory.
///
/// The loop halts at the first nonzero exit or executor error, never runs the
/// remaining blocks, and asks the relay for a single suggestion which is
/// returned to the caller, not applied.
pub struct SelfCorrectionLoop<'a, R> {
    relay: &'a R,
    executor: &'a SandboxedExecutor,
    workspace: &'a Workspace,
}

impl<'a, R: Relay> SelfCorrectionLoop<'a, R> {
    pub fn new(relay: &'a R, executor: &'a SandboxedExecutor, workspace: &'a Workspace) -> Self {
        Self {
            relay,
            executor,
            workspace,
        }
    }

    pub async fn run(&self, mut blocks: Vec<CommandBlock>) -> CorrectionOutcome {
        blocks.sort_by_key(|b| b.ordinal);
        let mut queue = blocks.into_iter();
        let mut outcome = CorrectionOutcome::default();
        let mut state = LoopState::Init;

        loop {
            tracing::trace!(?state, "correction loop");
            state = match state {
                LoopState::Init => LoopState::Executing,
                LoopState::Executing => match queue.next() {
                    None => LoopState::Done,
                    Some(block) => match self.executor.run(&block.command, self.workspace).await {
                        Ok(result) if result.succeeded() => {
                            outcome.executed.push(result);
                            LoopState::Executing
                        }
                        Ok(result) => {
                            let failure = BatchFailure {
                                command: block.command,
                                ordinal: block.ordinal,
                                error: result.error_text().trim().to_string(),
                                exit_code: Some(result.exit_code),
                            };
                            outcome.executed.push(result);
                            LoopState::Failed(failure)
                        }
                        Err(err) => LoopState::Failed(BatchFailure {
                            command: block.command,
                            ordinal: block.ordinal,
                            error: err.message().to_string(),
                            exit_code: None,
                        }),
                    },
                },
                LoopState::Failed(failure) => {
                    outcome.skipped = queue.len();
                    tracing::info!(
                        command = %failure.command,
                        exit_code = ?failure.exit_code,
                        skipped = outcome.skipped,
                        "batch halted"
                    );
                    LoopState::Correcting(failure)
                }
                LoopState::Correcting(failure) => {
                    let prompt = correction_prompt(&failure.command, &failure.error);
                    outcome.suggestion = Some(Advisory::request(self.relay, &prompt).await);
                    outcome.failure = Some(failure);
                    LoopState::Done
                }
                LoopState::Done => return outcome,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flare_core::{ChatMessage, Error, Result};

    struct DownRelay;

    impl Relay for DownRelay {
        async fn exchange(&self, _turns: &[ChatMessage]) -> Result<String> {
            Err(Error::relay_unreachable("connection refused"))
        }
    }

    fn block(command: &str, ordinal: usize) -> CommandBlock {
        CommandBlock {
            command: command.into(),
            ordinal,
        }
    }

    #[test]
    fn test_correction_prompt() {
        assert_eq!(
            correction_prompt("make", "no rule to make target"),
            "The command make failed with error: no rule to make target. Fix it."
        );
    }

    #[tokio::test]
    async fn test_runs_in_ordinal_order() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(tmp.path()).unwrap();
        let executor = SandboxedExecutor::new();

        let outcome = SelfCorrectionLoop::new(&DownRelay, &executor, &workspace)
            .run(vec![block("echo second", 1), block("echo first", 0)])
            .await;

        let out: Vec<&str> = outcome.executed.iter().map(|r| r.stdout.as_str()).collect();
        assert_eq!(out, vec!["first\n", "second\n"]);
        assert!(outcome.succeeded());
        assert_eq!(outcome.suggestion, None);
    }

    #[tokio::test]
    async fn test_relay_failure_still_reports_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(tmp.path()).unwrap();
        let executor = SandboxedExecutor::new();

        let outcome = SelfCorrectionLoop::new(&DownRelay, &executor, &workspace)
            .run(vec![block("exit 4", 0)])
            .await;

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.exit_code, Some(4));
        assert!(matches!(outcome.suggestion, Some(Advisory::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_executor_error_halts_without_result() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(tmp.path()).unwrap();
        let executor = SandboxedExecutor::new().with_timeout(std::time::Duration::from_millis(100));

        let outcome = SelfCorrectionLoop::new(&DownRelay, &executor, &workspace)
            .run(vec![block("sleep 5", 0), block("echo never", 1)])
            .await;

        assert!(outcome.executed.is_empty());
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.failure.unwrap().exit_code, None);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(tmp.path()).unwrap();
        let executor = SandboxedExecutor::new();

        let outcome = SelfCorrectionLoop::new(&DownRelay, &executor, &workspace).run(Vec::new()).await;
        assert_eq!(outcome, CorrectionOutcome::default());
    }
}
