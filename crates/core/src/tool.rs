//! Tool trait: the abstraction over agent capabilities.
//!
//! A tool is an immutable value addressed by its alias. Several instances of
//! the same kind (same declared name) can coexist under different aliases with
//! different configurations. Reconfiguring a tool means building a fresh
//! instance via [`Tool::reconfigure`] and swapping it in under the same alias.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::ToolError;
use crate::identity::IdentityContext;
use crate::schema;

/// Raw JSON object exchanged with tools.
pub type JsonMap = Map<String, Value>;

/// Everything the prompt needs to document one registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Registry key
    pub alias: String,

    /// Declared name of the tool kind
    pub name: String,

    pub short_description: String,

    pub long_description: String,

    pub input_schema: Value,

    pub output_schema: Value,

    /// Generated from `input_schema`
    pub example_input: JsonMap,
}

impl ToolDescriptor {
    /// Fields listed as required by the input schema.
    pub fn required_fields(&self) -> Vec<String> {
        schema::required_fields(&self.input_schema)
    }
}

/// A request to execute a tool, parsed from one `<TOOL>` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Alias of the target tool
    pub alias: String,

    /// Raw input object
    pub input: JsonMap,
}

impl ToolCallRequest {
    pub fn new(alias: impl Into<String>, input: JsonMap) -> Self {
        Self {
            alias: alias.into(),
            input,
        }
    }
}

/// The outcome of one tool call. Exactly one is produced per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    /// Alias the request addressed
    pub alias: String,

    /// `Ok(output)` on success, `Err(error text)` otherwise
    pub result: Result<JsonMap, String>,
}

impl ToolCallOutcome {
    pub fn success(alias: impl Into<String>, output: JsonMap) -> Self {
        Self {
            alias: alias.into(),
            result: Ok(output),
        }
    }

    pub fn failure(alias: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            result: Err(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn output(&self) -> Option<&JsonMap> {
        self.result.as_ref().ok()
    }

    /// Text appended to the conversation for this outcome.
    pub fn to_message_content(&self) -> String {
        match &self.result {
            Ok(output) => format!(
                "Tool '{}' result: {}",
                self.alias,
                Value::Object(output.clone())
            ),
            Err(error) => format!("Tool '{}' execution error: {}", self.alias, error),
        }
    }
}

/// The core Tool trait.
///
/// Implementations validate their own input and report failures through
/// [`ToolError`]; the executor turns every error into an outcome message so
/// the model can adapt.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key for this instance. Defaults to the declared name.
    fn alias(&self) -> &str {
        self.name()
    }

    /// Declared name of the tool kind (e.g., "calculator").
    fn name(&self) -> &str;

    /// One-line summary, also used to describe the output.
    fn short_description(&self) -> &str;

    /// Full description sent to the model.
    fn long_description(&self) -> &str {
        self.short_description()
    }

    /// JSON Schema of the input object.
    fn input_schema(&self) -> Value;

    /// JSON Schema of the output object.
    fn output_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    /// Current configuration.
    fn config(&self) -> Value {
        Value::Null
    }

    /// Build a new instance with `config`, keeping this instance's alias.
    fn reconfigure(&self, config: Value) -> Result<Arc<dyn Tool>, ToolError> {
        let _ = config;
        Err(ToolError::NotConfigurable(self.alias().to_string()))
    }

    /// Execute the tool. `identity` is supplied by the host, never by the model.
    async fn call(&self, input: JsonMap, identity: &IdentityContext) -> Result<JsonMap, ToolError>;

    /// Describe this tool for prompt rendering.
    fn descriptor(&self) -> ToolDescriptor {
        let input_schema = self.input_schema();
        ToolDescriptor {
            alias: self.alias().to_string(),
            name: self.name().to_string(),
            short_description: self.short_description().to_string(),
            long_description: self.long_description().to_string(),
            example_input: schema::example_input(&input_schema),
            input_schema,
            output_schema: self.output_schema(),
        }
    }
}
