//! Triage report types and text rendering

use crate::exec::ExecutionResult;
use crate::relay::Advisory;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;

/// Replay text for records whose target binary could not be resolved
pub const NO_TARGET_TEXT: &str = "no target program found for replay.";
/// Shown in place of an explanation the relay could not provide
pub const EXPLANATION_FALLBACK: &str = "Explanation unavailable.";

/// What happened when a crash input was replayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplayOutcome {
    /// The target ran; a nonzero exit or signal is the expected result
    Replayed(ExecutionResult),
    NoTarget,
    Failed { reason: String },
}

impl ReplayOutcome {
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            ReplayOutcome::Replayed(result) => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashRecord {
    pub file_name: String,
    pub corpus_path: PathBuf,
    pub replay: ReplayOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Advisory>,
}

impl CrashRecord {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "== {} ==", self.file_name);
        let _ = writeln!(out, "Input: {}", self.corpus_path.display());

        match &self.replay {
            ReplayOutcome::Replayed(result) => {
                let _ = writeln!(out, "Replay: {} ({})", result.command, result.status_line());
                for (label, stream) in [("stdout", &result.stdout), ("stderr", &result.stderr)] {
                    let stream = stream.trim_end();
                    if !stream.is_empty() {
                        let _ = writeln!(out, "{}:\n{}", label, stream);
                    }
                }
            }
            ReplayOutcome::NoTarget => {
                let _ = writeln!(out, "Replay: {}", NO_TARGET_TEXT);
            }
            ReplayOutcome::Failed { reason } => {
                let _ = writeln!(out, "Replay failed: {}", reason);
            }
        }

        if let Some(explanation) = &self.explanation {
            let _ = writeln!(out, "Explanation: {}", explanation.render(EXPLANATION_FALLBACK).trim_end());
        }
        out
    }
}

/// Everything known about one target's crashes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageReport {
    pub target: String,
    /// Fuzzer status text, or why it could not be obtained
    #[serde(default)]
    pub status: String,
    /// Set when the corpus itself could not be processed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub records: Vec<CrashRecord>,
}

impl TriageReport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Crash triage for '{}'", self.target);

        let status = self.status.trim_end();
        if !status.is_empty() {
            let _ = writeln!(out, "\nStatus:\n{}", status);
        }
        if let Some(error) = &self.error {
            let _ = writeln!(out, "\nError: {}", error);
        }

        let _ = writeln!(out, "\n{} crash input(s)", self.records.len());
        for record in &self.records {
            let _ = write!(out, "\n{}", record.render());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replayed() -> ExecutionResult {
        ExecutionResult {
            command: "./readpng crashes/id:000000".into(),
            stdout: String::new(),
            stderr: "AddressSanitizer: heap-buffer-overflow\n".into(),
            exit_code: 134,
            signal: Some(6),
        }
    }

    #[test]
    fn test_record_render() {
        let record = CrashRecord {
            file_name: "id:000000".into(),
            corpus_path: PathBuf::from("crashes/id:000000"),
            replay: ReplayOutcome::Replayed(replayed()),
            explanation: Some(Advisory::Unavailable { reason: "relay down".into() }),
        };
        let text = record.render();
        assert!(text.contains("exit code 134 (signal 6)"));
        assert!(text.contains("stderr:\nAddressSanitizer: heap-buffer-overflow"));
        assert!(!text.contains("stdout:"));
        assert!(text.contains("Explanation: Explanation unavailable. (relay down)"));
    }

    #[test]
    fn test_report_render_with_error() {
        let report = TriageReport {
            error: Some("no crash corpus found for target 'png'".into()),
            ..TriageReport::new("png")
        }
        .with_status("1 fuzzer alive");
        let text = report.render();
        assert!(text.contains("Status:\n1 fuzzer alive"));
        assert!(text.contains("Error: no crash corpus found"));
        assert!(text.contains("0 crash input(s)"));
    }

    #[test]
    fn test_json_shape() {
        let record = CrashRecord {
            file_name: "id:000001".into(),
            corpus_path: PathBuf::from("crashes/id:000001"),
            replay: ReplayOutcome::NoTarget,
            explanation: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["replay"]["outcome"], "no_target");
        assert!(json.get("explanation").is_none());

        let replayed = serde_json::to_value(ReplayOutcome::Replayed(replayed())).unwrap();
        assert_eq!(replayed["outcome"], "replayed");
        assert_eq!(replayed["exit_code"], 134);
    }
}
