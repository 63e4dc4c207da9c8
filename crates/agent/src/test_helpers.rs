//! Shared test helpers: a scripted backend and fixture tools.

use async_trait::async_trait;
use reagent_core::backend::{BackendResponse, LlmBackend, Usage};
use reagent_core::error::{BackendError, ToolError};
use reagent_core::identity::IdentityContext;
use reagent_core::message::Message;
use reagent_core::tool::{JsonMap, Tool};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A backend that replays scripted responses in order.
///
/// Once the script runs out it either repeats a fallback response or fails
/// with [`BackendError::Exhausted`].
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<BackendResponse, BackendError>>>,
    fallback: Option<BackendResponse>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<BackendResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            fallback: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Script of plain text responses with fixed usage.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| text_response(t)).collect())
    }

    /// Always answers `text`.
    pub fn repeating(text: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(text_response(text)),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Insert a failure at the front of the script.
    pub fn failing_first(self, error: BackendError) -> Self {
        self.responses.lock().unwrap().push_front(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Message lists received, one per call.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat_completion(&self, messages: &[Message]) -> Result<BackendResponse, BackendError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let next = self.responses.lock().unwrap().pop_front();
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(BackendError::Exhausted("script finished".into())),
        }
    }
}

/// An assistant response reporting 15 total tokens.
pub fn text_response(text: &str) -> BackendResponse {
    BackendResponse::assistant(text).with_usage(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Evaluates `"<number> <op> <number>"` with `+ - * /`.
pub struct CalcTool {
    alias: String,
    precision: u32,
}

impl CalcTool {
    pub fn with_alias(alias: &str) -> Self {
        Self {
            alias: alias.into(),
            precision: 2,
        }
    }
}

#[async_trait]
impl Tool for CalcTool {
    fn alias(&self) -> &str {
        &self.alias
    }

    fn name(&self) -> &str {
        "calculator"
    }

    fn short_description(&self) -> &str {
        "Evaluates a binary arithmetic expression"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {"type": "string", "description": "e.g. 2 + 2"}
            },
            "required": ["expression"]
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"result": {"type": "number"}},
            "required": ["result"]
        })
    }

    fn config(&self) -> Value {
        json!({ "precision": self.precision })
    }

    fn reconfigure(&self, config: Value) -> Result<Arc<dyn Tool>, ToolError> {
        let precision = config
            .get("precision")
            .and_then(Value::as_u64)
            .ok_or_else(|| ToolError::InvalidConfig("'precision' must be an integer".into()))?;
        Ok(Arc::new(CalcTool {
            alias: self.alias.clone(),
            precision: precision as u32,
        }))
    }

    async fn call(&self, input: JsonMap, _identity: &IdentityContext) -> Result<JsonMap, ToolError> {
        let expression = input
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("'expression' must be a string".into()))?;

        let parts: Vec<&str> = expression.split_whitespace().collect();
        let [lhs, op, rhs] = parts.as_slice() else {
            return Err(ToolError::InvalidArguments(format!(
                "cannot evaluate '{expression}'"
            )));
        };
        let parse = |s: &str| {
            s.parse::<f64>()
                .map_err(|_| ToolError::InvalidArguments(format!("'{s}' is not a number")))
        };
        let (a, b) = (parse(lhs)?, parse(rhs)?);

        let value = match *op {
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            "/" if b == 0.0 => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: self.alias.clone(),
                    reason: "division by zero".into(),
                });
            }
            "/" => a / b,
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "unsupported operator '{other}'"
                )));
            }
        };

        let scale = 10f64.powi(self.precision as i32);
        let rounded = (value * scale).round() / scale;
        let result = if rounded.fract() == 0.0 && rounded.abs() < i64::MAX as f64 {
            json!(rounded as i64)
        } else {
            json!(rounded)
        };

        let mut out = JsonMap::new();
        out.insert("result".into(), result);
        Ok(out)
    }
}

/// Always fails with the given reason.
pub struct FailingTool {
    alias: String,
    reason: String,
}

impl FailingTool {
    pub fn new(alias: &str, reason: &str) -> Self {
        Self {
            alias: alias.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn alias(&self) -> &str {
        &self.alias
    }
    fn name(&self) -> &str {
        "failing"
    }
    fn short_description(&self) -> &str {
        "Always fails"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn call(&self, _input: JsonMap, _identity: &IdentityContext) -> Result<JsonMap, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: self.alias.clone(),
            reason: self.reason.clone(),
        })
    }
}

/// Panics when called.
pub struct PanicTool {
    alias: String,
}

impl PanicTool {
    pub fn new(alias: &str) -> Self {
        Self { alias: alias.into() }
    }
}

#[async_trait]
impl Tool for PanicTool {
    fn alias(&self) -> &str {
        &self.alias
    }
    fn name(&self) -> &str {
        "panicking"
    }
    fn short_description(&self) -> &str {
        "Panics"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn call(&self, _input: JsonMap, _identity: &IdentityContext) -> Result<JsonMap, ToolError> {
        panic!("tool '{}' blew up", self.alias);
    }
}

/// Sleeps, then reports how long it slept.
pub struct DelayTool {
    alias: String,
    delay: Duration,
}

impl DelayTool {
    pub fn new(alias: &str, delay: Duration) -> Self {
        Self {
            alias: alias.into(),
            delay,
        }
    }
}

#[async_trait]
impl Tool for DelayTool {
    fn alias(&self) -> &str {
        &self.alias
    }
    fn name(&self) -> &str {
        "delay"
    }
    fn short_description(&self) -> &str {
        "Sleeps for a fixed duration"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn call(&self, _input: JsonMap, _identity: &IdentityContext) -> Result<JsonMap, ToolError> {
        tokio::time::sleep(self.delay).await;
        let mut out = JsonMap::new();
        out.insert("slept_ms".into(), json!(self.delay.as_millis() as u64));
        Ok(out)
    }
}

/// Echoes the `user_id` from the identity context. Alias `whoami`.
pub struct IdentityProbeTool;

#[async_trait]
impl Tool for IdentityProbeTool {
    fn name(&self) -> &str {
        "whoami"
    }
    fn short_description(&self) -> &str {
        "Reports the caller identity"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn call(&self, _input: JsonMap, identity: &IdentityContext) -> Result<JsonMap, ToolError> {
        let mut out = JsonMap::new();
        out.insert(
            "user_id".into(),
            identity.get("user_id").cloned().unwrap_or(Value::Null),
        );
        Ok(out)
    }
}
