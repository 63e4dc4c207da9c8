//! Run events: observe a loop without coupling to it.
//!
//! The loop publishes an event for each notable step. Hosts subscribe to
//! drive progress displays, audit logs, or metrics; with no subscribers,
//! publishing is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted while a run progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run started
    RunStarted {
        conversation_id: String,
        tools: usize,
        timestamp: DateTime<Utc>,
    },

    /// The backend produced a response
    ResponseGenerated {
        conversation_id: String,
        iteration: u32,
        tokens_used: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool call finished
    ToolExecuted {
        alias: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A result passed validation and deduplication
    ResultAccepted {
        conversation_id: String,
        total_results: usize,
        timestamp: DateTime<Utc>,
    },

    /// Tools were registered, removed, or reconfigured
    ToolsChanged {
        added: Vec<String>,
        removed: Vec<String>,
        reconfigured: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// An iteration failed and was reported to the model
    IterationFailed {
        conversation_id: String,
        iteration: u32,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// A run stopped
    RunTerminated {
        conversation_id: String,
        reason: String,
        iterations: u32,
        tokens_used: u64,
        results: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for run events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // no subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
