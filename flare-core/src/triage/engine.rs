//! # Crash triage engine
//!
//! Walks a target's crash corpus in name order, replays every input and asks
//! the relay to explain each crash. Nothing that goes wrong with one input
//! (replay spawn failure, timeout, relay error) stops the others: every corpus
//! file yields exactly one [`CrashRecord`].

use super::report::{CrashRecord, ReplayOutcome, TriageReport};
use super::target::{list_corpus, FuzzTarget, NamePatterns};
use crate::config::FuzzConfig;
use crate::error::Error;
use crate::exec::{run_process, ExecutionResult, ProcessSpec};
use crate::relay::{Advisory, Relay};
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

/// How a crash input is fed back to the target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ReplayStrategy {
    /// Run the binary with the crash file as its only argument
    #[default]
    Direct,
    /// Run an external replay tool; `{binary}` and `{input}` in `args` are substituted
    Tool {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl ReplayStrategy {
    fn process(&self, binary: &Path, input: &Path, cwd: &Path) -> ProcessSpec {
        let (program, args): (OsString, Vec<OsString>) = match self {
            ReplayStrategy::Direct => (binary.into(), vec![input.into()]),
            ReplayStrategy::Tool { program, args } => (
                program.into(),
                args.iter().map(|arg| substitute(arg, binary, input)).collect(),
            ),
        };

        let label = std::iter::once(&program)
            .chain(args.iter())
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        ProcessSpec::new(program, cwd).args(args).with_label(label)
    }
}

fn substitute(arg: &str, binary: &Path, input: &Path) -> OsString {
    match arg {
        "{binary}" => binary.into(),
        "{input}" => input.into(),
        _ => arg
            .replace("{binary}", &binary.to_string_lossy())
            .replace("{input}", &input.to_string_lossy())
            .into(),
    }
}

pub struct CrashTriageEngine<R> {
    relay: R,
    replay: ReplayStrategy,
    replay_timeout: Duration,
    explain_max_chars: usize,
    ignore: NamePatterns,
}

impl<R: Relay> CrashTriageEngine<R> {
    pub fn new(relay: R, config: &FuzzConfig) -> Self {
        Self {
            relay,
            replay: config.replay.clone(),
            replay_timeout: config.replay_timeout(),
            explain_max_chars: config.explain_max_chars,
            ignore: NamePatterns::new(&config.corpus_ignore),
        }
    }

    pub fn with_replay_timeout(mut self, timeout: Duration) -> Self {
        self.replay_timeout = timeout;
        self
    }

    /// Replay and explain every crash of `target`, running replays inside `workspace`
    pub async fn triage(&self, target: &FuzzTarget, workspace: &Workspace) -> TriageReport {
        let mut report = TriageReport::new(&target.name);

        let Some(corpus_dir) = &target.crash_corpus_dir else {
            let err = Error::corpus_not_found(&target.name).with_operation("triage");
            tracing::warn!(target = %target.name, error = %err, "no crash corpus");
            report.error = Some(err.message().to_string());
            return report;
        };

        let files = match list_corpus(corpus_dir, &self.ignore) {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(target = %target.name, error = %err, "cannot list crash corpus");
                report.error = Some(format!("cannot list {}: {}", corpus_dir.display(), err.message()));
                return report;
            }
        };

        // Replays run with the workspace as cwd; if it cannot exist every replay fails alike
        let workspace_ready = workspace.ensure().map_err(|e| e.message().to_string());

        tracing::info!(target = %target.name, crashes = files.len(), "triaging corpus");
        for path in files {
            let record = self.triage_one(target, &path, workspace, workspace_ready.as_ref().err()).await;
            report.records.push(record);
        }
        report
    }

    async fn triage_one(
        &self,
        target: &FuzzTarget,
        path: &Path,
        workspace: &Workspace,
        workspace_error: Option<&String>,
    ) -> CrashRecord {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let replay = match (&target.resolved_binary, workspace_error) {
            (None, _) => ReplayOutcome::NoTarget,
            (Some(_), Some(reason)) => ReplayOutcome::Failed { reason: reason.clone() },
            (Some(binary), None) => self.replay_one(&file_name, binary, path, workspace).await,
        };

        let explanation = match &replay {
            ReplayOutcome::Replayed(result) => {
                let prompt = self.explain_prompt(&target.name, &file_name, result);
                Some(Advisory::request(&self.relay, &prompt).await)
            }
            ReplayOutcome::NoTarget | ReplayOutcome::Failed { .. } => None,
        };

        CrashRecord {
            file_name,
            corpus_path: path.to_path_buf(),
            replay,
            explanation,
        }
    }

    async fn replay_one(&self, file_name: &str, binary: &Path, input: &Path, workspace: &Workspace) -> ReplayOutcome {
        let spec = self
            .replay
            .process(binary, input, workspace.root())
            .with_timeout(self.replay_timeout);

        match run_process(&spec).await {
            Ok(result) => {
                tracing::debug!(crash = file_name, exit_code = result.exit_code, signal = ?result.signal, "replayed");
                ReplayOutcome::Replayed(result)
            }
            Err(err) => {
                let err = Error::replay_error(file_name, err.message()).set_source(err);
                tracing::warn!(crash = file_name, error = %err, "replay failed");
                ReplayOutcome::Failed {
                    reason: err.message().to_string(),
                }
            }
        }
    }

    fn explain_prompt(&self, target: &str, file_name: &str, result: &ExecutionResult) -> String {
        format!(
            "The fuzz target '{}' crashed while replaying the input '{}'.\n\
             Command: {}\n\
             Result: {}\n\n\
             stdout:\n{}\n\n\
             stderr:\n{}\n\n\
             Explain briefly what most likely caused this crash.",
            target,
            file_name,
            result.command,
            result.status_line(),
            truncate(&result.stdout, self.explain_max_chars),
            truncate(&result.stderr, self.explain_max_chars),
        )
    }
}

/// Keep at most `max_chars` characters of `text`
fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n[truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;
    use crate::triage::report::{EXPLANATION_FALLBACK, NO_TARGET_TEXT};
    use crate::Result;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Explains every crash except those whose prompt mentions `fail_on`
    struct ScriptedRelay {
        fail_on: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedRelay {
        fn new(fail_on: &'static str) -> Self {
            Self {
                fail_on,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl Relay for ScriptedRelay {
        async fn exchange(&self, turns: &[ChatMessage]) -> Result<String> {
            let prompt = turns.last().map(|t| t.content.clone()).unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt.clone());
            if prompt.contains(self.fail_on) {
                return Err(Error::relay_unreachable("connection refused"));
            }
            Ok("Out-of-bounds read in the chunk parser.".into())
        }
    }

    struct Fixture {
        tmp: tempfile::TempDir,
        config: FuzzConfig,
        workspace: Workspace,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let config = FuzzConfig {
                root: tmp.path().join("fuzz"),
                ..Default::default()
            };
            let workspace = Workspace::open(tmp.path().join("ws")).unwrap();
            Self { tmp, config, workspace }
        }

        fn crash(&self, name: &str, contents: &str) {
            let dir = self.config.root.join("png/output/default/crashes");
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(name), contents).unwrap();
        }

        /// Use the system shell as the target so each crash file is a script
        fn shell_binary(&self) {
            let dir = self.config.root.join("png/target");
            std::fs::create_dir_all(&dir).unwrap();
            std::os::unix::fs::symlink("/bin/sh", dir.join("png")).unwrap();
        }

        fn target(&self) -> FuzzTarget {
            FuzzTarget::resolve("png", &self.config).unwrap()
        }
    }

    #[tokio::test]
    async fn test_no_binary_marks_every_record() {
        let fx = Fixture::new();
        fx.crash("id:000000", "");
        fx.crash("id:000001", "");
        let relay = ScriptedRelay::new("never");

        let report = CrashTriageEngine::new(&relay, &fx.config)
            .triage(&fx.target(), &fx.workspace)
            .await;

        assert_eq!(report.error, None);
        assert_eq!(report.records.len(), 2);
        for record in &report.records {
            assert_eq!(record.replay, ReplayOutcome::NoTarget);
            assert!(record.render().contains(NO_TARGET_TEXT));
            assert_eq!(record.explanation, None);
        }
        assert!(relay.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_every_corpus_file_gets_a_record() {
        let fx = Fixture::new();
        for name in ["id:000000", "crash-1.txt", "poc.md", ".hidden", "README.txt"] {
            fx.crash(name, "");
        }
        let relay = ScriptedRelay::new("never");

        let report = CrashTriageEngine::new(&relay, &fx.config)
            .triage(&fx.target(), &fx.workspace)
            .await;

        let names: Vec<&str> = report.records.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec![".hidden", "crash-1.txt", "id:000000", "poc.md"]);
    }

    #[tokio::test]
    async fn test_missing_corpus_is_single_error() {
        let fx = Fixture::new();
        let relay = ScriptedRelay::new("never");

        let report = CrashTriageEngine::new(&relay, &fx.config)
            .triage(&fx.target(), &fx.workspace)
            .await;

        assert!(report.records.is_empty());
        assert!(report.error.as_deref().unwrap().contains("no crash corpus found"));
    }

    #[tokio::test]
    async fn test_direct_replay_and_partial_explanations() {
        let fx = Fixture::new();
        fx.shell_binary();
        fx.crash("id:000000", "echo boom >&2; exit 3\n");
        fx.crash("id:000001", "kill -SEGV $$\n");
        fx.crash("README.txt", "not a crash");
        let relay = ScriptedRelay::new("id:000001");

        let report = CrashTriageEngine::new(&relay, &fx.config)
            .triage(&fx.target(), &fx.workspace)
            .await;

        assert_eq!(report.records.len(), 2);
        let first = &report.records[0];
        let result = first.replay.result().unwrap();
        assert_eq!(first.file_name, "id:000000");
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr, "boom\n");
        assert_eq!(
            first.explanation.as_ref().and_then(|a| a.text()),
            Some("Out-of-bounds read in the chunk parser.")
        );

        let second = &report.records[1];
        assert_eq!(second.replay.result().unwrap().signal, Some(11));
        assert!(second.explanation.as_ref().unwrap().text().is_none());
        assert!(second.render().contains(EXPLANATION_FALLBACK));

        let prompts = relay.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("boom"));
    }

    #[tokio::test]
    async fn test_tool_replay_substitutes_placeholders() {
        let mut fx = Fixture::new();
        fx.shell_binary();
        fx.crash("id:000000", "");
        fx.config.replay = ReplayStrategy::Tool {
            program: "echo".into(),
            args: vec!["replay".into(), "{binary}".into(), "--input={input}".into()],
        };
        let relay = ScriptedRelay::new("never");

        let report = CrashTriageEngine::new(&relay, &fx.config)
            .triage(&fx.target(), &fx.workspace)
            .await;

        let target = fx.target();
        let binary = target.resolved_binary.unwrap();
        let input = target.crash_corpus_dir.unwrap().join("id:000000");
        let result = report.records[0].replay.result().unwrap();
        assert_eq!(
            result.stdout,
            format!("replay {} --input={}\n", binary.display(), input.display())
        );
        assert!(result.command.starts_with("echo replay "));
        assert!(fx.tmp.path().exists());
    }

    #[tokio::test]
    async fn test_replay_timeout_degrades_one_record() {
        let mut fx = Fixture::new();
        fx.shell_binary();
        fx.crash("id:000000", "sleep 5\n");
        fx.crash("id:000001", "exit 1\n");
        fx.config.replay = ReplayStrategy::Direct;
        let relay = ScriptedRelay::new("never");

        let report = CrashTriageEngine::new(&relay, &fx.config)
            .with_replay_timeout(Duration::from_millis(500))
            .triage(&fx.target(), &fx.workspace)
            .await;

        assert_eq!(report.records.len(), 2);
        assert!(matches!(report.records[0].replay, ReplayOutcome::Failed { .. }));
        assert_eq!(report.records[0].explanation, None);
        assert_eq!(report.records[1].replay.result().unwrap().exit_code, 1);
        assert!(report.records[1].explanation.is_some());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé\n[truncated]");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exact", 5), "exact");
    }
}
