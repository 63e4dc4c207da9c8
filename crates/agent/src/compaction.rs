//! History compaction policy.
//!
//! The mechanics live in [`Conversation::compact`]; this module decides when
//! to apply them.

use reagent_core::message::Conversation;
use tracing::info;

/// When and how much history to collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionPolicy {
    /// Messages kept verbatim at the end
    pub recent_tail: usize,
    /// Conversations this short are left alone
    pub min_messages: usize,
    /// Compact once the estimate exceeds this many tokens
    pub threshold_tokens: u64,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            recent_tail: 6,
            min_messages: 10,
            threshold_tokens: 2 * 4000,
        }
    }
}

impl CompactionPolicy {
    /// Threshold derived from a per-response budget and a multiplier.
    pub fn from_response_budget(
        max_tokens_per_response: u64,
        multiplier: u64,
        recent_tail: usize,
        min_messages: usize,
    ) -> Self {
        Self {
            recent_tail,
            min_messages,
            threshold_tokens: max_tokens_per_response.saturating_mul(multiplier),
        }
    }

    pub fn should_compact(&self, conversation: &Conversation, estimated_tokens: u64) -> bool {
        estimated_tokens > self.threshold_tokens && conversation.len() > self.min_messages
    }

    /// Compact if over threshold. Returns the number of collapsed messages.
    pub fn maybe_compact(&self, conversation: &mut Conversation, estimated_tokens: u64) -> usize {
        if !self.should_compact(conversation, estimated_tokens) {
            return 0;
        }
        let collapsed = conversation.compact(self.recent_tail, self.min_messages);
        if collapsed > 0 {
            info!(
                collapsed,
                remaining = conversation.len(),
                estimated_tokens,
                "Compacted conversation"
            );
        }
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reagent_core::message::Message;

    fn long_conversation(n: usize) -> Conversation {
        let mut conv = Conversation::new();
        conv.push(Message::system("prompt"));
        conv.push(Message::user("task"));
        for i in 0..n {
            conv.push(Message::assistant(format!("step {i}")));
        }
        conv
    }

    #[test]
    fn below_threshold_is_untouched() {
        let policy = CompactionPolicy::from_response_budget(100, 2, 6, 10);
        let mut conv = long_conversation(20);
        assert_eq!(policy.maybe_compact(&mut conv, 200), 0);
        assert_eq!(conv.len(), 22);
    }

    #[test]
    fn short_conversation_is_untouched() {
        let policy = CompactionPolicy::from_response_budget(100, 2, 6, 10);
        let mut conv = long_conversation(5);
        assert!(!policy.should_compact(&conv, 10_000));
        assert_eq!(policy.maybe_compact(&mut conv, 10_000), 0);
    }

    #[test]
    fn over_threshold_compacts() {
        let policy = CompactionPolicy::from_response_budget(100, 2, 6, 10);
        let mut conv = long_conversation(20);
        // 22 messages: 1 system kept, 6 in the tail, 15 collapsed
        assert_eq!(policy.maybe_compact(&mut conv, 201), 15);
        assert_eq!(conv.len(), 8);
        assert_eq!(conv.messages[0].content, "prompt");
        assert_eq!(conv.messages[7].content, "step 19");
    }
}
