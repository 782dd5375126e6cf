//! # Model relay
//!
//! One blocking round trip to a language model: a message goes out, a reply
//! comes back. No retries happen here; callers decide what to do with errors.

use crate::error::{self, Error, Result};
use crate::provider::{ChatMessage, CompletionRequest, LlmProvider};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request/response access to a language model
#[allow(async_fn_in_trait)]
pub trait Relay {
    /// System prompt prepended to single-message sends
    fn system_prompt(&self) -> Option<&str> {
        None
    }

    /// Send a full conversation and return the assistant reply
    async fn exchange(&self, turns: &[ChatMessage]) -> Result<String>;

    /// Send one user message
    async fn send(&self, message: &str) -> Result<String> {
        let mut turns = Vec::with_capacity(2);
        if let Some(system) = self.system_prompt() {
            turns.push(ChatMessage::system(system));
        }
        turns.push(ChatMessage::user(message));
        self.exchange(&turns).await
    }
}

impl<R: Relay> Relay for &R {
    fn system_prompt(&self) -> Option<&str> {
        (**self).system_prompt()
    }

    async fn exchange(&self, turns: &[ChatMessage]) -> Result<String> {
        (**self).exchange(turns).await
    }
}

/// Relay over an [`LlmProvider`] with a hard deadline per call
pub struct ChatRelay<P> {
    provider: P,
    system_prompt: Option<String>,
    timeout: Duration,
}

impl<P: LlmProvider> ChatRelay<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            system_prompt: None,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: LlmProvider> Relay for ChatRelay<P> {
    fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    async fn exchange(&self, turns: &[ChatMessage]) -> Result<String> {
        tracing::debug!(provider = self.provider.name(), turns = turns.len(), "relay exchange");

        let request = CompletionRequest::new(turns.to_vec());
        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| Error::relay_timeout(self.timeout.as_secs()))?
            .map_err(error::from_provider)
            .map_err(|e| e.with_operation("relay::exchange").with_context("provider", self.provider.name()))?;

        match response.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(Error::relay_bad_response("empty reply")
                .with_operation("relay::exchange")
                .with_context("provider", self.provider.name())),
        }
    }
}

/// Outcome of a best-effort relay call.
///
/// Suggestions and crash explanations must never fail the surrounding
/// operation, so the failure is kept as data and only turned into display
/// text when a report is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Advisory {
    Provided { text: String },
    Unavailable { reason: String },
}

impl Advisory {
    /// Ask the relay and capture the outcome
    pub async fn request<R: Relay>(relay: &R, message: &str) -> Self {
        match relay.send(message).await {
            Ok(text) => Advisory::Provided { text },
            Err(err) => {
                tracing::warn!(error = %err, "relay call failed; continuing without advice");
                Advisory::Unavailable { reason: err.to_string() }
            }
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Advisory::Provided { text } => Some(text),
            Advisory::Unavailable { .. } => None,
        }
    }

    /// Display text, substituting `fallback` when no advice was obtained
    pub fn render(&self, fallback: &str) -> String {
        match self {
            Advisory::Provided { text } => text.clone(),
            Advisory::Unavailable { reason } => format!("{} ({})", fallback, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CompletionResponse, FinishReason, ProviderError, Usage};
    use crate::ErrorKind;

    struct FixedProvider {
        reply: Option<&'static str>,
        delay: Duration,
    }

    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn default_model(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
            tokio::time::sleep(self.delay).await;
            let reply = self.reply.ok_or_else(|| ProviderError::Network("refused".into()))?;
            Ok(CompletionResponse {
                model: "fixed".into(),
                content: Some(format!("{} ({} turns)", reply, request.messages.len())),
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
            })
        }
    }

    #[tokio::test]
    async fn test_send_prepends_system_prompt() {
        let relay = ChatRelay::new(FixedProvider { reply: Some("hi"), delay: Duration::ZERO })
            .with_system_prompt("You are a helpful assistant.");
        assert_eq!(relay.send("hello").await.unwrap(), "hi (2 turns)");
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let relay = ChatRelay::new(FixedProvider { reply: None, delay: Duration::ZERO });
        let err = relay.send("hello").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RelayUnreachable);
        assert_eq!(err.operation(), "relay::exchange");
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let relay = ChatRelay::new(FixedProvider { reply: Some("late"), delay: Duration::from_secs(5) })
            .with_timeout(Duration::from_millis(50));
        let err = relay.send("hello").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RelayTimeout);
    }

    #[tokio::test]
    async fn test_advisory_captures_failure() {
        let relay = ChatRelay::new(FixedProvider { reply: None, delay: Duration::ZERO });
        let advisory = Advisory::request(&relay, "explain").await;
        assert!(advisory.text().is_none());
        assert!(advisory.render("Explanation unavailable.").starts_with("Explanation unavailable. ("));
    }
}
