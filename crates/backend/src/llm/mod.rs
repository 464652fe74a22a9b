//! Language model access for the scheduling agent.

mod agent;
mod openrouter;

pub use agent::{AgentError, SchedulingAgent};
pub use openrouter::OpenRouterClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One chat completion request. With `response_schema` set the model is
/// asked to answer with JSON matching it.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub response_schema: Option<Value>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to model provider failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model provider response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("model provider returned no choices")]
    EmptyResponse,
}

impl LlmError {
    /// Transport failures, rate limiting and server errors are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Status { status, .. } => *status == 429 || *status >= 500,
            LlmError::Decode(_) | LlmError::EmptyResponse => false,
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion and return the assistant's text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        let status = |status| LlmError::Status {
            status,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(401).is_retryable());
        assert!(!LlmError::EmptyResponse.is_retryable());
    }
}
