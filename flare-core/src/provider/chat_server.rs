//! Chat server provider - talks to a flare chat server
//!
//! The chat server is a thin stateless front for a model backend. It accepts a
//! single message and answers with either a reply or an error string:
//!
//! ```text
//! POST /chat  {"message": "..."}
//!   -> {"response": "..."}
//!   -> {"error": "..."}
//! ```
//!
//! The server keeps no history, so only the latest user turn is forwarded.

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Request body of the chat server wire contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatServerRequest {
    pub message: String,
}

/// Response body of the chat server wire contract.
///
/// Also used by the CLI for `--json` output so that both sides of the
/// contract share one shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayEnvelope {
    pub fn response(text: impl Into<String>) -> Self {
        Self { response: Some(text.into()), error: None }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { response: None, error: Some(text.into()) }
    }
}

/// Chat server provider
pub struct ChatServerProvider {
    client: Client,
    config: ProviderConfig,
}

impl ChatServerProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = build_client(&config, 120)?;
        Ok(Self { client, config })
    }

    /// Create with default local chat server settings
    pub fn local() -> Result<Self, ProviderError> {
        Self::new(ProviderConfig::chat_server())
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or("http://localhost:5001")
    }
}

impl LlmProvider for ChatServerProvider {
    fn name(&self) -> &str {
        "chat-server"
    }

    fn default_model(&self) -> &str {
        // The server picks its own model
        self.config.default_model.as_deref().unwrap_or("server-default")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let message = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .ok_or_else(|| ProviderError::Other("No user message to send".into()))?;

        let response = self.client
            .post(format!("{}/chat", self.base_url()))
            .json(&ChatServerRequest { message })
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message: text });
        }

        let envelope: RelayEnvelope = response.json().await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        match envelope {
            RelayEnvelope { error: Some(error), .. } => Err(ProviderError::Backend(error)),
            RelayEnvelope { response: Some(content), .. } => Ok(CompletionResponse {
                model: self.default_model().to_string(),
                content: Some(content),
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
            }),
            _ => Err(ProviderError::Parse("envelope has neither response nor error".into())),
        }
    }
}
