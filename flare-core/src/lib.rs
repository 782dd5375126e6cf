//! # Flare core
//!
//! Drive and triage a fuzzing campaign by talking to a language model.
//!
//! ## Core Concepts
//! - **Relay**: One request/response round trip to a model backend (OpenAI or chat server)
//! - **Extraction**: Fenced command blocks pulled out of a model reply, in order
//! - **Workspace**: The session-scoped directory every command runs in
//! - **Executor**: Shell commands run inside a workspace with a timeout
//! - **Triage**: Crash corpus replay with per-crash explanations
//! - **Advisory**: Best-effort model output that never fails the caller

pub mod config;
pub mod conversation;
pub mod error;
pub mod exec;
pub mod extract;
pub mod playbook;
pub mod probe;
pub mod provider;
pub mod relay;
pub mod triage;
pub mod workspace;

pub use config::{ExecConfig, FlareConfig, FuzzConfig, RelayBackend, RelayConfig, WorkspaceConfig};
pub use conversation::Conversation;
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use exec::{ExecutionResult, OutputPolicy, SandboxedExecutor};
pub use extract::{extract, prose, CommandBlock, CommandBlocks};
pub use playbook::Playbook;
pub use probe::FuzzStatusProbe;
pub use provider::{
    AnyProvider, ChatMessage, ChatServerProvider, CompletionRequest, CompletionResponse, FinishReason,
    LlmProvider, OpenAIProvider, ProviderConfig, ProviderError, ProviderType, RelayEnvelope, Role, Usage,
};
pub use relay::{Advisory, ChatRelay, Relay};
pub use triage::{
    BinaryStrategy, CorpusLayout, CrashRecord, CrashTriageEngine, FuzzTarget, ReplayOutcome, ReplayStrategy,
    TriageReport, NO_TARGET_TEXT,
};
pub use workspace::Workspace;
