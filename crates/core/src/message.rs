//! Message and Conversation domain types.
//!
//! A conversation starts with one system message (the rendered prompt) and one
//! task message, then grows by appending assistant responses, tool outcomes,
//! and synthetic system notices. Compaction is the only operation that removes
//! messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (one per run/reset).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions, tool notices, compaction summaries
    System,
    /// The task, tool outcomes, and error feedback
    User,
    /// The model
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// When the message was created
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters, rounded down.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// Per-message formatting overhead used by [`estimate_conversation_tokens`].
pub const MESSAGE_OVERHEAD_TOKENS: u64 = 10;

/// Estimate tokens for a message list including per-message overhead.
pub fn estimate_conversation_tokens(messages: &[Message]) -> u64 {
    messages
        .iter()
        .map(|m| estimate_tokens(&m.content) + MESSAGE_OVERHEAD_TOKENS)
        .sum()
}

/// An ordered sequence of messages belonging to one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Get the total token count estimate.
    pub fn estimated_tokens(&self) -> u64 {
        estimate_conversation_tokens(&self.messages)
    }

    /// Collapse older history into a single summary placeholder.
    ///
    /// Every system message is kept, as are the last `recent_tail` messages.
    /// All other messages are replaced by one system summary inserted just
    /// before the tail. Conversations with `min_messages` or fewer messages
    /// are left alone. Returns the number of collapsed messages.
    pub fn compact(&mut self, recent_tail: usize, min_messages: usize) -> usize {
        if self.messages.len() <= min_messages || self.messages.len() <= recent_tail {
            return 0;
        }

        let split = self.messages.len() - recent_tail;
        let collapsed = self.messages[..split]
            .iter()
            .filter(|m| m.role != Role::System)
            .count();
        if collapsed == 0 {
            return 0;
        }

        let tail = self.messages.split_off(split);
        let mut kept: Vec<Message> = std::mem::take(&mut self.messages)
            .into_iter()
            .filter(|m| m.role == Role::System)
            .collect();
        kept.push(Message::system(format!(
            "[Earlier conversation summary: {collapsed} messages exchanged]"
        )));
        kept.extend(tail);

        self.messages = kept;
        self.updated_at = Utc::now();
        collapsed
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
