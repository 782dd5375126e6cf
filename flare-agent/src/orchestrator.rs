//! Orchestrator - top-level chat, execute and triage requests

use crate::correction::{CorrectionOutcome, SelfCorrectionLoop};
use flare_core::{
    extract, CommandBlock, Conversation, CrashTriageEngine, FlareConfig, FuzzConfig, FuzzStatusProbe, FuzzTarget,
    Playbook, Relay, Result, SandboxedExecutor, TriageReport, Workspace,
};
use serde::Serialize;

/// One model reply and, when requested, what running its commands did
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    /// Serialized as `response` so a turn reads like a relay envelope
    #[serde(rename = "response")]
    pub reply: String,
    pub blocks: Vec<CommandBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<CorrectionOutcome>,
}

/// Owns one session: its workspace, conversation and collaborators.
///
/// Requests run one at a time to completion; nothing inside a request runs
/// concurrently.
pub struct Orchestrator<R> {
    relay: R,
    executor: SandboxedExecutor,
    workspace: Workspace,
    playbook: Playbook,
    fuzz: FuzzConfig,
    conversation: Conversation,
}

impl<R: Relay> Orchestrator<R> {
    pub fn new(relay: R, workspace: Workspace) -> Self {
        let conversation = match relay.system_prompt() {
            Some(prompt) => Conversation::with_system(prompt),
            None => Conversation::new(),
        };
        Self {
            relay,
            executor: SandboxedExecutor::new(),
            workspace,
            playbook: Playbook::new(),
            fuzz: FuzzConfig::default(),
            conversation,
        }
    }

    /// Build from configuration, loading the playbook if one is named
    pub fn from_config(relay: R, workspace: Workspace, config: &FlareConfig) -> Result<Self> {
        let playbook = match &config.playbook {
            Some(path) => Playbook::load(path)?,
            None => Playbook::new(),
        };
        Ok(Self::new(relay, workspace)
            .with_executor(config.exec.executor())
            .with_playbook(playbook)
            .with_fuzz_config(config.fuzz.clone()))
    }

    pub fn with_executor(mut self, executor: SandboxedExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_playbook(mut self, playbook: Playbook) -> Self {
        self.playbook = playbook;
        self
    }

    pub fn with_fuzz_config(mut self, fuzz: FuzzConfig) -> Self {
        self.fuzz = fuzz;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Send a message as the next turn of the session conversation.
    ///
    /// Relay errors propagate; execution failures are reported in the turn.
    pub async fn chat(&mut self, message: &str, execute: bool) -> Result<ChatTurn> {
        let message = self.playbook.merge(message);
        let reply = self.conversation.send(&self.relay, message).await?;
        Ok(self.finish_turn(reply, execute).await)
    }

    /// Send a standalone message, outside the session conversation
    pub async fn ask(&self, message: &str, execute: bool) -> Result<ChatTurn> {
        let message = self.playbook.merge(message);
        let reply = self.relay.send(&message).await?;
        Ok(self.finish_turn(reply, execute).await)
    }

    /// Run commands in order, stopping at the first failure
    pub async fn execute(&self, commands: Vec<String>) -> CorrectionOutcome {
        let blocks = commands
            .into_iter()
            .enumerate()
            .map(|(ordinal, command)| CommandBlock { command, ordinal })
            .collect();
        self.run_blocks(blocks).await
    }

    /// Status probe plus crash triage for one target, merged into one report.
    ///
    /// Only an invalid target name is an error; probe and per-crash failures
    /// are written into the report.
    pub async fn triage(&self, target: &str) -> Result<TriageReport> {
        let target = FuzzTarget::resolve(target, &self.fuzz)?;

        let status = match FuzzStatusProbe::from_config(&self.fuzz)
            .status(&target, &self.workspace)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(target = %target.name, error = %err, "status probe failed");
                format!("Status unavailable: {}", err.message())
            }
        };

        let report = CrashTriageEngine::new(&self.relay, &self.fuzz)
            .triage(&target, &self.workspace)
            .await;
        Ok(report.with_status(status))
    }

    async fn finish_turn(&self, reply: String, execute: bool) -> ChatTurn {
        let blocks: Vec<CommandBlock> = extract(&reply).collect();
        let execution = if execute && !blocks.is_empty() {
            Some(self.run_blocks(blocks.clone()).await)
        } else {
            None
        };
        ChatTurn {
            reply,
            blocks,
            execution,
        }
    }

    async fn run_blocks(&self, blocks: Vec<CommandBlock>) -> CorrectionOutcome {
        SelfCorrectionLoop::new(&self.relay, &self.executor, &self.workspace)
            .run(blocks)
            .await
    }
}
