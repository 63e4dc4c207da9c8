//! The ReAct loop: reason, act, observe, repeat.
//!
//! One [`ReactLoop`] owns a conversation, a tool registry, and the run
//! counters. Each iteration:
//!
//! 1. refreshes the system prompt if the tool set or prompt inputs changed
//! 2. compacts history once it grows past the token threshold
//! 3. calls the backend with the full message list
//! 4. appends the response and accepts any `<RESULT>` blocks
//! 5. evaluates the completion predicate
//! 6. dispatches every `<TOOL>` block, even when the response completed the task
//!
//! A failed iteration becomes one user message and the loop moves on to the
//! guards: completion, timeout, token budget, iteration ceiling. Callers can
//! drive the loop with [`ReactLoop::run`] or one iteration at a time with
//! [`ReactLoop::step`], mutating the registry in between.

use chrono::Utc;
use futures::FutureExt;
use reagent_config::AgentConfig;
use reagent_core::backend::LlmBackend;
use reagent_core::error::{Error, RegistryError};
use reagent_core::event::{DomainEvent, EventBus};
use reagent_core::identity::IdentityContext;
use reagent_core::message::{Conversation, ConversationId, Message, Role};
use reagent_core::tool::Tool;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::budget::{BudgetGuard, BudgetUsage, TerminationReason};
use crate::compaction::CompactionPolicy;
use crate::executor::{DEFAULT_MAX_PARALLEL, OutputHook, ToolExecutor};
use crate::parser;
use crate::prompt::{self, DEFAULT_SYSTEM_PROMPT, PromptRenderer, TAG_INSTRUCTIONS};
use crate::registry::{ToolRegistry, ToolSummary};
use crate::results::{Offer, ResultStore};

/// Decides whether a response completes the task.
pub trait CompletionPredicate: Send + Sync {
    fn is_complete(&self, response: &str) -> bool;
}

impl<F> CompletionPredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_complete(&self, response: &str) -> bool {
        self(response)
    }
}

/// Complete when the response contains a marker substring.
#[derive(Debug, Clone)]
pub struct MarkerCompletion {
    marker: String,
}

impl MarkerCompletion {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Default for MarkerCompletion {
    fn default() -> Self {
        Self::new("TASK_COMPLETE")
    }
}

impl CompletionPredicate for MarkerCompletion {
    fn is_complete(&self, response: &str) -> bool {
        response.contains(&self.marker)
    }
}

/// Lifecycle of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Uninitialized,
    Initialized,
    Running,
    Terminated(TerminationReason),
}

impl LoopState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

/// Tunables for one loop, usually derived from an [`AgentConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub guard: BudgetGuard,
    pub compaction: CompactionPolicy,
    pub max_parallel_tools: usize,
    pub completion_marker: String,
    pub system_prompt_template: String,
    pub params: BTreeMap<String, String>,
    pub result_schema: Option<Value>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            guard: BudgetGuard::default(),
            compaction: CompactionPolicy::default(),
            max_parallel_tools: DEFAULT_MAX_PARALLEL,
            completion_marker: "TASK_COMPLETE".into(),
            system_prompt_template: DEFAULT_SYSTEM_PROMPT.into(),
            params: BTreeMap::new(),
            result_schema: None,
        }
    }
}

impl From<&AgentConfig> for LoopSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            guard: BudgetGuard::new(
                Duration::from_secs(config.run.timeout_secs),
                config.run.token_limit,
                config.run.max_iterations,
            ),
            compaction: CompactionPolicy::from_response_budget(
                config.run.max_tokens_per_response,
                config.compaction.threshold_multiplier,
                config.compaction.recent_tail,
                config.compaction.min_messages,
            ),
            max_parallel_tools: config.executor.max_parallel_tools,
            completion_marker: config.run.completion_marker.clone(),
            system_prompt_template: config
                .prompt
                .system_prompt_template
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.into()),
            params: config.prompt.params.clone(),
            result_schema: config.result_schema.clone(),
        }
    }
}

/// Terminal summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub conversation_id: ConversationId,
    pub reason: TerminationReason,
    pub iterations: u32,
    pub tokens_used: u64,
    pub results: Vec<Value>,
    pub elapsed: Duration,
    pub is_complete: bool,
}

impl RunSnapshot {
    pub fn result_count(&self) -> usize {
        self.results.len()
    }
}

/// Point-in-time view of a loop.
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    pub state: LoopState,
    pub is_complete: bool,
    pub runtime: Duration,
    pub total_tokens_used: u64,
    pub iterations: u32,
    pub conversation_length: usize,
    pub results_count: usize,
    pub tools_registered: usize,
}

/// A ReAct agent loop bound to one backend.
pub struct ReactLoop {
    backend: Arc<dyn LlmBackend>,
    registry: ToolRegistry,
    renderer: PromptRenderer,
    executor: ToolExecutor,
    results: ResultStore,
    guard: BudgetGuard,
    compaction: CompactionPolicy,
    completion: Arc<dyn CompletionPredicate>,
    event_bus: Arc<EventBus>,

    conversation: Conversation,
    state: LoopState,
    started_at: Option<Instant>,
    tokens_used: u64,
    iterations: u32,
    complete: bool,
}

impl ReactLoop {
    /// Create a loop with default settings.
    pub fn new(backend: Arc<dyn LlmBackend>, task: impl Into<String>) -> Self {
        Self::with_settings(backend, task, LoopSettings::default())
    }

    /// Create a loop from a loaded configuration.
    pub fn from_config(
        backend: Arc<dyn LlmBackend>,
        task: impl Into<String>,
        config: &AgentConfig,
    ) -> Self {
        Self::with_settings(backend, task, LoopSettings::from(config))
    }

    pub fn with_settings(
        backend: Arc<dyn LlmBackend>,
        task: impl Into<String>,
        settings: LoopSettings,
    ) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let renderer = PromptRenderer::new(settings.system_prompt_template, task)
            .with_params(settings.params)
            .with_completion_marker(settings.completion_marker.clone())
            .with_result_schema(settings.result_schema.clone());

        Self {
            backend,
            registry: ToolRegistry::new(),
            renderer,
            executor: ToolExecutor::new(IdentityContext::new(), event_bus.clone())
                .with_max_parallel(settings.max_parallel_tools),
            results: ResultStore::new(settings.result_schema),
            guard: settings.guard,
            compaction: settings.compaction,
            completion: Arc::new(MarkerCompletion::new(settings.completion_marker)),
            event_bus,
            conversation: Conversation::new(),
            state: LoopState::Uninitialized,
            started_at: None,
            tokens_used: 0,
            iterations: 0,
            complete: false,
        }
    }

    /// Register the initial tool set. Fails on duplicate aliases.
    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Result<Self, RegistryError> {
        self.register_tools(tools)?;
        Ok(self)
    }

    /// Identity handed to every tool call.
    pub fn with_identity(mut self, identity: IdentityContext) -> Self {
        self.executor = self.executor.with_identity(identity);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.executor = self.executor.with_event_bus(event_bus.clone());
        self.event_bus = event_bus;
        self
    }

    pub fn with_output_hook(mut self, hook: Arc<dyn OutputHook>) -> Self {
        self.executor.set_hook(Some(hook));
        self
    }

    pub fn with_completion(mut self, predicate: Arc<dyn CompletionPredicate>) -> Self {
        self.completion = predicate;
        self
    }

    // ── Accessors ──

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn results(&self) -> &[Value] {
        self.results.results()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn list_tools(&self) -> Vec<ToolSummary> {
        self.registry.list()
    }

    pub fn tool_config(&self, alias: &str) -> Option<Value> {
        self.registry.config_of(alias)
    }

    pub fn status(&self) -> LoopStatus {
        LoopStatus {
            state: self.state,
            is_complete: self.complete,
            runtime: self.elapsed(),
            total_tokens_used: self.tokens_used,
            iterations: self.iterations,
            conversation_length: self.conversation.len(),
            results_count: self.results.len(),
            tools_registered: self.registry.len(),
        }
    }

    /// Summary of the finished run, if it has terminated.
    pub fn snapshot(&self) -> Option<RunSnapshot> {
        match self.state {
            LoopState::Terminated(reason) => Some(self.build_snapshot(reason)),
            _ => None,
        }
    }

    // ── Tool management ──

    /// Register tools, announcing each one if the conversation is live.
    pub fn register_tools(&mut self, tools: Vec<Arc<dyn Tool>>) -> Result<(), RegistryError> {
        let added = self.registry.register(tools)?;
        if added.is_empty() {
            return Ok(());
        }
        if self.is_live() {
            for descriptor in &added {
                self.conversation
                    .push(Message::system(prompt::tool_introduction(descriptor)));
            }
        }
        self.event_bus.publish(DomainEvent::ToolsChanged {
            added: added.into_iter().map(|d| d.alias).collect(),
            removed: vec![],
            reconfigured: vec![],
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Remove a tool. Returns whether it was registered.
    pub fn unregister_tool(&mut self, alias: &str) -> bool {
        let Some(tool) = self.registry.unregister(alias) else {
            return false;
        };
        if self.is_live() {
            self.conversation
                .push(Message::system(prompt::tool_removal(alias, tool.name())));
        }
        self.event_bus.publish(DomainEvent::ToolsChanged {
            added: vec![],
            removed: vec![alias.to_string()],
            reconfigured: vec![],
            timestamp: Utc::now(),
        });
        true
    }

    /// Rebuild a tool under the same alias with a new configuration.
    pub fn update_tool_config(&mut self, alias: &str, config: Value) -> Result<(), RegistryError> {
        self.registry.update_config(alias, config)?;
        self.event_bus.publish(DomainEvent::ToolsChanged {
            added: vec![],
            removed: vec![],
            reconfigured: vec![alias.to_string()],
            timestamp: Utc::now(),
        });
        Ok(())
    }

    // ── Prompt inputs ──

    pub fn set_task(&mut self, task: impl Into<String>) {
        self.renderer.set_task(task);
    }

    pub fn set_system_prompt_template(&mut self, template: impl Into<String>) {
        self.renderer.set_template(template);
    }

    pub fn set_result_schema(&mut self, schema: Option<Value>) {
        self.renderer.set_result_schema(schema.clone());
        self.results.set_schema(schema);
    }

    pub fn set_prompt_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.renderer.set_param(name, value);
    }

    /// The current system prompt, rendered on demand.
    pub fn system_prompt(&mut self) -> String {
        self.renderer.render(&self.registry).to_string()
    }

    // ── Lifecycle ──

    /// Start a fresh conversation: the rendered prompt plus the task message.
    pub fn initialize(&mut self) {
        let prompt = format!("{}{}", self.renderer.render(&self.registry), TAG_INSTRUCTIONS);
        let mut conversation = Conversation::new();
        conversation.push(Message::system(prompt));
        conversation.push(Message::user(format!(
            "Please complete this task: {}",
            self.renderer.task()
        )));

        self.conversation = conversation;
        self.state = LoopState::Initialized;
        debug!(conversation_id = %self.conversation.id, "Conversation initialized");
    }

    /// Drop the conversation and run state, keeping tools and settings.
    pub fn reset(&mut self) {
        self.results.clear();
        self.started_at = None;
        self.tokens_used = 0;
        self.iterations = 0;
        self.complete = false;
        self.initialize();
        info!(conversation_id = %self.conversation.id, "Conversation and results reset");
    }

    /// Run until a guard trips and return the terminal snapshot.
    ///
    /// A loop that already terminated starts over with a fresh conversation.
    pub async fn run(&mut self) -> RunSnapshot {
        if self.state.is_terminated() {
            self.reset();
        }
        loop {
            if let Some(reason) = self.step().await {
                return self.build_snapshot(reason);
            }
        }
    }

    /// Check the guards and, if none trips, run one iteration.
    ///
    /// Returns the termination reason once the run is over; further calls
    /// keep returning it.
    pub async fn step(&mut self) -> Option<TerminationReason> {
        match self.state {
            LoopState::Terminated(reason) => return Some(reason),
            LoopState::Uninitialized => self.initialize(),
            LoopState::Initialized | LoopState::Running => {}
        }
        if self.started_at.is_none() {
            self.start();
        }

        if let Some(reason) = self.guard.check(&self.usage()) {
            self.finish(reason);
            return Some(reason);
        }

        self.iterations += 1;
        let iteration = self.iterations;
        debug!(iteration, results = self.results.len(), "ReAct iteration");

        let outcome = AssertUnwindSafe(self.iterate(iteration))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(Error::Internal(format!(
                    "iteration panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
        if let Err(e) = outcome {
            warn!(iteration, error = %e, "Iteration failed");
            self.conversation.push(Message::user(format!(
                "System error: {e}. Please continue or indicate completion."
            )));
            self.event_bus.publish(DomainEvent::IterationFailed {
                conversation_id: self.conversation.id.to_string(),
                iteration,
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        None
    }

    async fn iterate(&mut self, iteration: u32) -> Result<(), Error> {
        self.refresh_prompt();

        let estimated = self
            .backend
            .count_conversation_tokens(&self.conversation.messages);
        self.compaction
            .maybe_compact(&mut self.conversation, estimated);

        let response = self
            .backend
            .chat_completion(&self.conversation.messages)
            .await?;

        let tokens = match response.usage {
            Some(usage) => u64::from(usage.total_tokens),
            None => self.backend.count_tokens(&response.content),
        };
        self.tokens_used += tokens;
        self.event_bus.publish(DomainEvent::ResponseGenerated {
            conversation_id: self.conversation.id.to_string(),
            iteration,
            tokens_used: tokens,
            timestamp: Utc::now(),
        });

        let content = response.content;
        self.conversation.push(Message::assistant(content.clone()));

        for result in parser::parse_results(&content) {
            self.offer_result(result);
        }

        if self.completion.is_complete(&content) {
            info!(iteration, "Agent indicated task completion");
            self.complete = true;
        }

        let requests = parser::parse_tool_calls(&content);
        if !requests.is_empty() {
            debug!(iteration, calls = requests.len(), "Dispatching tool calls");
            let harvested = self
                .executor
                .dispatch(&self.registry, requests, &mut self.conversation)
                .await;
            for candidate in harvested {
                self.offer_result(candidate);
            }
        }
        Ok(())
    }

    fn offer_result(&mut self, value: Value) {
        if self.results.offer(value) == Offer::Accepted {
            self.event_bus.publish(DomainEvent::ResultAccepted {
                conversation_id: self.conversation.id.to_string(),
                total_results: self.results.len(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Replace the leading system prompt when its inputs changed.
    fn refresh_prompt(&mut self) {
        if self.renderer.is_cached(&self.registry) {
            return;
        }
        let prompt = format!("{}{}", self.renderer.render(&self.registry), TAG_INSTRUCTIONS);
        if let Some(first) = self.conversation.messages.first_mut()
            && first.role == Role::System
        {
            first.content = prompt;
            debug!("System prompt refreshed");
        }
    }

    fn start(&mut self) {
        self.started_at = Some(Instant::now());
        self.state = LoopState::Running;
        info!(
            conversation_id = %self.conversation.id,
            tools = self.registry.len(),
            max_iterations = self.guard.max_iterations,
            "ReAct loop starting"
        );
        self.event_bus.publish(DomainEvent::RunStarted {
            conversation_id: self.conversation.id.to_string(),
            tools: self.registry.len(),
            timestamp: Utc::now(),
        });
    }

    fn finish(&mut self, reason: TerminationReason) {
        let removed = self.results.deduplicate();
        if removed > 0 {
            info!(removed, "Removed duplicate results");
        }
        self.state = LoopState::Terminated(reason);

        info!(
            reason = %reason,
            iterations = self.iterations,
            tokens = self.tokens_used,
            results = self.results.len(),
            "ReAct loop finished"
        );
        self.event_bus.publish(DomainEvent::RunTerminated {
            conversation_id: self.conversation.id.to_string(),
            reason: reason.to_string(),
            iterations: self.iterations,
            tokens_used: self.tokens_used,
            results: self.results.len(),
            timestamp: Utc::now(),
        });
    }

    fn build_snapshot(&self, reason: TerminationReason) -> RunSnapshot {
        RunSnapshot {
            conversation_id: self.conversation.id.clone(),
            reason,
            iterations: self.iterations,
            tokens_used: self.tokens_used,
            results: self.results.results().to_vec(),
            elapsed: self.elapsed(),
            is_complete: self.complete,
        }
    }

    fn usage(&self) -> BudgetUsage {
        BudgetUsage {
            complete: self.complete,
            elapsed: self.elapsed(),
            tokens: self.tokens_used,
            iterations: self.iterations,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    fn is_live(&self) -> bool {
        self.state != LoopState::Uninitialized
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
