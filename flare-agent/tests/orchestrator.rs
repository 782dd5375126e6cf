#![cfg(unix)]

use flare_agent::Orchestrator;
use flare_core::{
    Advisory, ChatMessage, Error, ErrorKind, FuzzConfig, Playbook, Relay, Result, Workspace, NO_TARGET_TEXT,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Mutex;

/// Replies with a fixed text (or fails) and records every outbound message
struct MockRelay {
    reply: Option<&'static str>,
    seen: Mutex<Vec<String>>,
}

impl MockRelay {
    fn replying(reply: &'static str) -> Self {
        Self {
            reply: Some(reply),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn down() -> Self {
        Self {
            reply: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Relay for MockRelay {
    fn system_prompt(&self) -> Option<&str> {
        Some("You are a helpful assistant.")
    }

    async fn exchange(&self, turns: &[ChatMessage]) -> Result<String> {
        let last = turns.last().map(|t| t.content.clone()).unwrap_or_default();
        self.seen.lock().unwrap().push(last);
        self.reply
            .map(str::to_string)
            .ok_or_else(|| Error::relay_unreachable("connection refused"))
    }
}

fn workspace(tmp: &Path) -> Workspace {
    Workspace::open(tmp.join("ws")).unwrap().session("test").unwrap()
}

#[tokio::test]
async fn test_second_of_three_commands_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let relay = MockRelay::replying("Use `exit 0` instead.");
    let orchestrator = Orchestrator::new(&relay, workspace(tmp.path()));

    let outcome = orchestrator
        .execute(vec![
            "echo one".into(),
            "echo bad >&2; exit 2".into(),
            "touch third".into(),
        ])
        .await;

    assert_eq!(outcome.executed.len(), 2);
    assert_eq!(outcome.executed[0].stdout, "one\n");
    assert_eq!(outcome.executed[1].exit_code, 2);
    assert_eq!(outcome.skipped, 1);

    let failure = outcome.failure.as_ref().unwrap();
    assert_eq!(failure.ordinal, 1);
    assert_eq!(failure.error, "bad");
    assert_eq!(
        outcome.suggestion,
        Some(Advisory::Provided {
            text: "Use `exit 0` instead.".into()
        })
    );
    assert_eq!(
        relay.seen(),
        vec!["The command echo bad >&2; exit 2 failed with error: bad. Fix it.".to_string()]
    );
    assert!(!orchestrator.workspace().root().join("third").exists());
}

#[tokio::test]
async fn test_chat_executes_reply_blocks() {
    let tmp = tempfile::tempdir().unwrap();
    let relay = MockRelay::replying("Run this:\n```bash\necho hi\n```");
    let mut orchestrator = Orchestrator::new(&relay, workspace(tmp.path()));

    let turn = orchestrator.chat("say hi", true).await.unwrap();

    assert_eq!(turn.blocks.len(), 1);
    let execution = turn.execution.unwrap();
    assert!(execution.succeeded());
    assert_eq!(execution.executed[0].stdout, "hi\n");
    assert_eq!(orchestrator.conversation().len(), 3);
}

#[tokio::test]
async fn test_chat_without_execute_runs_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let relay = MockRelay::replying("```\ntouch marker\n```");
    let mut orchestrator = Orchestrator::new(&relay, workspace(tmp.path()));

    let turn = orchestrator.chat("make a marker", false).await.unwrap();

    assert_eq!(turn.blocks[0].command, "touch marker");
    assert!(turn.execution.is_none());
    assert!(!orchestrator.workspace().root().join("marker").exists());
}

#[tokio::test]
async fn test_playbook_is_merged_into_prompts() {
    let tmp = tempfile::tempdir().unwrap();
    let relay = MockRelay::replying("ok");
    let orchestrator = Orchestrator::new(&relay, workspace(tmp.path()))
        .with_playbook(Playbook::new().with_entry("fuzzer", "afl++"));

    orchestrator.ask("start a campaign", false).await.unwrap();
    orchestrator.ask("start a campaign with afl++", false).await.unwrap();

    let seen = relay.seen();
    assert_eq!(seen[0], "start a campaign\n\nPlaybook:\n- fuzzer: afl++");
    assert_eq!(seen[1], "start a campaign with afl++");
}

#[tokio::test]
async fn test_chat_relay_failure_propagates() {
    let tmp = tempfile::tempdir().unwrap();
    let relay = MockRelay::down();
    let mut orchestrator = Orchestrator::new(&relay, workspace(tmp.path()));

    let err = orchestrator.chat("hello", true).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RelayUnreachable);
    assert_eq!(orchestrator.conversation().len(), 2);
}

#[tokio::test]
async fn test_triage_merges_status_and_records() {
    let tmp = tempfile::tempdir().unwrap();
    let crashes = tmp.path().join("fuzz/png/output/default/crashes");
    std::fs::create_dir_all(&crashes).unwrap();
    std::fs::write(crashes.join("id:000000"), b"\x00\x01").unwrap();
    std::fs::write(crashes.join("id:000001"), b"\xff").unwrap();

    let relay = MockRelay::replying("explained");
    let orchestrator = Orchestrator::new(&relay, workspace(tmp.path())).with_fuzz_config(FuzzConfig {
        root: tmp.path().join("fuzz"),
        status_tool: "flare-missing-status-tool".into(),
        ..Default::default()
    });

    let report = orchestrator.triage("png").await.unwrap();
    assert!(report.status.starts_with("Status unavailable:"));
    assert_eq!(report.records.len(), 2);
    assert!(report.records.iter().all(|r| r.render().contains(NO_TARGET_TEXT)));

    let missing = orchestrator.triage("ghost").await.unwrap();
    assert!(missing.error.is_some());
    assert!(missing.records.is_empty());

    let err = orchestrator.triage("../etc").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(relay.seen().is_empty());
}

#[tokio::test]
async fn test_chat_turn_json() {
    let tmp = tempfile::tempdir().unwrap();
    let relay = MockRelay::replying("```\nexit 7\n```");
    let orchestrator = Orchestrator::new(&relay, workspace(tmp.path()));

    let turn = orchestrator.ask("fail please", true).await.unwrap();
    let json = serde_json::to_value(&turn).unwrap();

    assert_eq!(json["blocks"][0]["command"], "exit 7");
    assert_eq!(json["execution"]["failure"]["exit_code"], 7);
    assert_eq!(json["execution"]["suggestion"]["status"], "provided");
}
