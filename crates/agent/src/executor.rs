//! Tool execution: inline for a single call, a bounded task pool for many.
//!
//! Every request yields exactly one [`ToolCallOutcome`]. Unknown aliases,
//! tool errors, and panics all become error outcomes; nothing escapes to the
//! caller. A pool of size `min(n, max_parallel)` drains in completion order.

use chrono::Utc;
use futures::FutureExt;
use reagent_core::error::ToolError;
use reagent_core::event::{DomainEvent, EventBus};
use reagent_core::identity::IdentityContext;
use reagent_core::message::{Conversation, Message};
use reagent_core::tool::{JsonMap, Tool, ToolCallOutcome, ToolCallRequest};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::registry::ToolRegistry;

/// Default upper bound on concurrently running tool calls.
pub const DEFAULT_MAX_PARALLEL: usize = 5;

/// Post-processing strategy invoked with every successful tool output.
///
/// Returns result candidates harvested from the output; the loop offers them
/// to its result store like `<RESULT>` blocks.
pub trait OutputHook: Send + Sync {
    fn on_output(&self, alias: &str, output: &JsonMap) -> Vec<Value>;
}

impl<F> OutputHook for F
where
    F: Fn(&str, &JsonMap) -> Vec<Value> + Send + Sync,
{
    fn on_output(&self, alias: &str, output: &JsonMap) -> Vec<Value> {
        self(alias, output)
    }
}

/// Harvests the items of an array field (e.g. `"results"`) from the output
/// of selected tools.
#[derive(Debug, Clone)]
pub struct ArrayFieldHook {
    field: String,
    aliases: Vec<String>,
}

impl ArrayFieldHook {
    /// Harvest `field` from every tool.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            aliases: Vec::new(),
        }
    }

    /// Restrict harvesting to the given aliases.
    pub fn only(mut self, aliases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }
}

impl OutputHook for ArrayFieldHook {
    fn on_output(&self, alias: &str, output: &JsonMap) -> Vec<Value> {
        if !self.aliases.is_empty() && !self.aliases.iter().any(|a| a == alias) {
            return Vec::new();
        }
        match output.get(&self.field) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}

/// Runs tool calls against a registry snapshot.
pub struct ToolExecutor {
    max_parallel: usize,
    identity: Arc<IdentityContext>,
    hook: Option<Arc<dyn OutputHook>>,
    event_bus: Arc<EventBus>,
}

impl ToolExecutor {
    pub fn new(identity: IdentityContext, event_bus: Arc<EventBus>) -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            identity: Arc::new(identity),
            hook: None,
            event_bus,
        }
    }

    /// Set the pool size. Values below 1 are treated as 1.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn OutputHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_identity(mut self, identity: IdentityContext) -> Self {
        self.identity = Arc::new(identity);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn set_hook(&mut self, hook: Option<Arc<dyn OutputHook>>) {
        self.hook = hook;
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Execute `requests` and return one outcome per request.
    ///
    /// A single request, or a pool size of 1, runs inline in request order.
    /// Otherwise requests are spawned onto a pool of `min(n, max_parallel)`
    /// and outcomes are returned in completion order.
    pub async fn execute(
        &self,
        registry: &ToolRegistry,
        requests: Vec<ToolCallRequest>,
    ) -> Vec<ToolCallOutcome> {
        match requests.len() {
            0 => Vec::new(),
            1 => self.execute_sequential(registry, requests).await,
            _ if self.max_parallel == 1 => self.execute_sequential(registry, requests).await,
            _ => self.execute_parallel(registry, requests).await,
        }
    }

    /// Execute `requests`, append one user message per outcome, and run the
    /// hook on each successful output. Returns the harvested candidates.
    pub async fn dispatch(
        &self,
        registry: &ToolRegistry,
        requests: Vec<ToolCallRequest>,
        conversation: &mut Conversation,
    ) -> Vec<Value> {
        let outcomes = self.execute(registry, requests).await;
        let mut harvested = Vec::new();

        for outcome in outcomes {
            conversation.push(Message::user(outcome.to_message_content()));
            if let (Some(hook), Some(output)) = (&self.hook, outcome.output()) {
                harvested.extend(hook.on_output(&outcome.alias, output));
            }
        }
        harvested
    }

    async fn execute_sequential(
        &self,
        registry: &ToolRegistry,
        requests: Vec<ToolCallRequest>,
    ) -> Vec<ToolCallOutcome> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            let tool = registry.get(&request.alias);
            let (outcome, duration_ms) = run_guarded(request, tool, self.identity.clone()).await;
            self.publish(&outcome, duration_ms);
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn execute_parallel(
        &self,
        registry: &ToolRegistry,
        requests: Vec<ToolCallRequest>,
    ) -> Vec<ToolCallOutcome> {
        let pool = self.max_parallel.min(requests.len());
        info!(calls = requests.len(), pool, "Executing tool calls in parallel");

        let permits = Arc::new(Semaphore::new(pool));
        let mut set = JoinSet::new();
        let mut pending: Vec<Option<String>> = Vec::with_capacity(requests.len());

        for (idx, request) in requests.into_iter().enumerate() {
            let tool = registry.get(&request.alias);
            let identity = self.identity.clone();
            let permits = permits.clone();
            pending.push(Some(request.alias.clone()));

            set.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let (outcome, duration_ms) = run_guarded(request, tool, identity).await;
                (idx, outcome, duration_ms)
            });
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome, duration_ms)) => {
                    if let Some(slot) = pending.get_mut(idx) {
                        slot.take();
                    }
                    self.publish(&outcome, duration_ms);
                    outcomes.push(outcome);
                }
                Err(e) => error!(error = %e, "Tool task failed to complete"),
            }
        }

        // Tasks that never reported still owe an outcome
        for alias in pending.into_iter().flatten() {
            let outcome = panicked(&alias);
            self.publish(&outcome, 0);
            outcomes.push(outcome);
        }
        outcomes
    }

    fn publish(&self, outcome: &ToolCallOutcome, duration_ms: u64) {
        self.event_bus.publish(DomainEvent::ToolExecuted {
            alias: outcome.alias.clone(),
            success: outcome.is_success(),
            duration_ms,
            timestamp: Utc::now(),
        });
    }
}

/// Run one call with panic containment. Returns the outcome and its duration.
async fn run_guarded(
    request: ToolCallRequest,
    tool: Option<Arc<dyn Tool>>,
    identity: Arc<IdentityContext>,
) -> (ToolCallOutcome, u64) {
    let alias = request.alias.clone();
    let start = Instant::now();
    let outcome = AssertUnwindSafe(run_one(request, tool, identity))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| panicked(&alias));
    (outcome, start.elapsed().as_millis() as u64)
}

async fn run_one(
    request: ToolCallRequest,
    tool: Option<Arc<dyn Tool>>,
    identity: Arc<IdentityContext>,
) -> ToolCallOutcome {
    let ToolCallRequest { alias, input } = request;
    let Some(tool) = tool else {
        warn!(alias = %alias, "Tool call for unknown alias");
        return ToolCallOutcome::failure(alias.clone(), ToolError::NotFound(alias).to_string());
    };

    match tool.call(input, &identity).await {
        Ok(output) => {
            debug!(alias = %alias, "Tool executed successfully");
            ToolCallOutcome::success(alias, output)
        }
        Err(e) => {
            warn!(alias = %alias, error = %e, "Tool execution failed");
            ToolCallOutcome::failure(alias, e.to_string())
        }
    }
}

fn panicked(alias: &str) -> ToolCallOutcome {
    error!(alias, "Tool panicked during execution");
    ToolCallOutcome::failure(alias, ToolError::Panicked(alias.to_string()).to_string())
}
