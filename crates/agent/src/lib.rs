//! The ReAct loop for reagent.
//!
//! The loop alternates model calls with tool calls, driven entirely by tags
//! in the model's text:
//!
//! 1. **Render** the system prompt from the template, task, and tool set
//! 2. **Call** the backend with the whole conversation
//! 3. **Extract** `<RESULT>` blocks (validated, deduplicated) and `<TOOL>` blocks
//! 4. **Execute** tool calls, inline or on a bounded pool, appending one outcome each
//! 5. **Guard** against completion, timeout, token budget, and iteration ceiling
//!
//! Tools can be added, removed, or reconfigured between iterations; the model
//! is told about every change.

pub mod budget;
pub mod compaction;
pub mod executor;
pub mod parser;
pub mod prompt;
pub mod react;
pub mod registry;
pub mod results;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use budget::{BudgetGuard, BudgetUsage, TerminationReason};
pub use compaction::CompactionPolicy;
pub use executor::{ArrayFieldHook, OutputHook, ToolExecutor};
pub use parser::{ParsedResponse, extract_all, parse_results, parse_tool_calls};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, PromptRenderer};
pub use react::{
    CompletionPredicate, LoopSettings, LoopState, LoopStatus, MarkerCompletion, ReactLoop,
    RunSnapshot,
};
pub use registry::{ToolRegistry, ToolSummary};
pub use results::{Offer, ResultStore, canonical_json};
