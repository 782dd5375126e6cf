//! Multi-turn conversation history
//!
//! Turns are append-only and replayed verbatim on every exchange, so the
//! model always sees the causal history in order.

use crate::error::Result;
use crate::provider::{ChatMessage, Role};
use crate::relay::Relay;

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation with a system prompt as its first turn
    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![ChatMessage::system(prompt)],
        }
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Last assistant reply, if any
    pub fn last_reply(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(|t| t.content.as_str())
    }

    /// Append a user turn, exchange the full history, append the reply.
    ///
    /// On failure the user turn stays in the history and no assistant turn
    /// is added.
    pub async fn send<R: Relay>(&mut self, relay: &R, message: impl Into<String>) -> Result<String> {
        self.turns.push(ChatMessage::user(message));
        let reply = relay.exchange(&self.turns).await?;
        self.turns.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }
}
