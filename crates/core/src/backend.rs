//! Backend trait: the abstraction over LLM services.
//!
//! A backend receives the full ordered message list and returns one complete
//! response. The loop never looks at anything beyond the fields of
//! [`BackendResponse`], so OpenAI-compatible, Anthropic, or scripted test
//! backends are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::message::{self, Message, Role};

/// Token usage information reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) response from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendResponse {
    /// Role of the reply, normally [`Role::Assistant`]
    pub role: Role,

    /// The generated text
    pub content: String,

    /// Token usage statistics, when the backend reports them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Why generation stopped (e.g. "stop", "length")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl BackendResponse {
    /// An assistant reply without usage information.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            usage: None,
            finish_reason: Some("stop".into()),
        }
    }

    /// Attach usage counts.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// The core backend trait.
///
/// Every LLM service implements this trait. The agent loop calls
/// `chat_completion()` without knowing which service is behind it.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "openrouter", "anthropic").
    fn name(&self) -> &str;

    /// Send the conversation and get a complete response.
    async fn chat_completion(&self, messages: &[Message]) -> Result<BackendResponse, BackendError>;

    /// Estimate the token count of a text.
    ///
    /// Used when a response carries no usage. Override for backend-specific
    /// tokenization.
    fn count_tokens(&self, text: &str) -> u64 {
        message::estimate_tokens(text)
    }

    /// Estimate the token count of a whole message list.
    fn count_conversation_tokens(&self, messages: &[Message]) -> u64 {
        messages
            .iter()
            .map(|m| self.count_tokens(&m.content) + message::MESSAGE_OVERHEAD_TOKENS)
            .sum()
    }
}
