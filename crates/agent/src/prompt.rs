//! System prompt rendering.
//!
//! The rendered prompt is a pure function of the template, the task
//! description, the registered tools, the result schema, and the custom
//! parameters. It is memoized and re-rendered only when one of those inputs
//! changes: the registry side is tracked through
//! [`ToolRegistry::generation`], everything else through a local version
//! counter bumped by the setters.
//!
//! Templates use `{{name}}` placeholders. Built-in names:
//!
//! - `task_description`
//! - `tools_documentation`
//! - `result_schema` (pretty JSON, empty when unset)
//! - `result_schema_section` (a short heading plus the schema, empty when unset)
//! - `completion_marker`
//!
//! Unknown placeholders are left in place.

use reagent_core::tool::ToolDescriptor;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::registry::ToolRegistry;

/// Built-in system prompt template.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an autonomous agent that completes tasks by reasoning step by step and calling tools.

{{tools_documentation}}

Task: {{task_description}}

Instructions:
1. Decide what information you still need
2. Call tools with <TOOL> blocks to gather it
3. Report every structured finding in its own <RESULT> block
4. When the task is finished, include "{{completion_marker}}" in your response

{{result_schema_section}}"#;

/// Appended to the first system message of every conversation.
pub const TAG_INSTRUCTIONS: &str = r#"

IMPORTANT: When invoking tools or returning results, use the following XML-like tag format:

For tool calls:
<TOOL>
{
    "tool": "tool_alias",
    "input": {
        "param1": "value1",
        "param2": "value2"
    }
}
</TOOL>

You can make multiple tool calls in a single response. They will be executed in parallel when possible.

For structured results:
<RESULT>
{
    "key": "value",
    "another_key": "another_value"
}
</RESULT>

Always use proper JSON inside the tags. Tool names must match the registered tool aliases exactly as shown in the tool documentation above."#;

/// Builds and caches the system prompt.
#[derive(Debug, Clone)]
pub struct PromptRenderer {
    template: String,
    task: String,
    result_schema: Option<Value>,
    params: BTreeMap<String, String>,
    completion_marker: String,
    version: u64,
    cached: Option<CachedPrompt>,
    renders: u64,
}

#[derive(Debug, Clone)]
struct CachedPrompt {
    registry_generation: u64,
    version: u64,
    text: String,
}

impl PromptRenderer {
    pub fn new(template: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            task: task.into(),
            result_schema: None,
            params: BTreeMap::new(),
            completion_marker: "TASK_COMPLETE".into(),
            version: 0,
            cached: None,
            renders: 0,
        }
    }

    /// Use [`DEFAULT_SYSTEM_PROMPT`].
    pub fn with_default_template(task: impl Into<String>) -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT, task)
    }

    pub fn with_result_schema(mut self, schema: Option<Value>) -> Self {
        self.result_schema = schema;
        self
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_completion_marker(mut self, marker: impl Into<String>) -> Self {
        self.completion_marker = marker.into();
        self
    }

    pub fn set_template(&mut self, template: impl Into<String>) {
        self.template = template.into();
        self.invalidate();
    }

    pub fn set_task(&mut self, task: impl Into<String>) {
        self.task = task.into();
        self.invalidate();
    }

    pub fn set_result_schema(&mut self, schema: Option<Value>) {
        self.result_schema = schema;
        self.invalidate();
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
        self.invalidate();
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn result_schema(&self) -> Option<&Value> {
        self.result_schema.as_ref()
    }

    /// Drop the cached prompt.
    pub fn invalidate(&mut self) {
        self.version += 1;
    }

    /// Whether the next [`render`](Self::render) would be served from cache.
    pub fn is_cached(&self, registry: &ToolRegistry) -> bool {
        self.cached.as_ref().is_some_and(|c| {
            c.registry_generation == registry.generation() && c.version == self.version
        })
    }

    /// How many times the template has actually been rendered.
    pub fn render_count(&self) -> u64 {
        self.renders
    }

    /// Render the system prompt for the current tool set.
    pub fn render(&mut self, registry: &ToolRegistry) -> &str {
        if !self.is_cached(registry) {
            let text = self.render_uncached(registry);
            self.renders += 1;
            debug!(
                generation = registry.generation(),
                chars = text.len(),
                "Rendered system prompt"
            );
            self.cached = Some(CachedPrompt {
                registry_generation: registry.generation(),
                version: self.version,
                text,
            });
        }
        self.cached.as_ref().map(|c| c.text.as_str()).unwrap_or_default()
    }

    fn render_uncached(&self, registry: &ToolRegistry) -> String {
        let mut vars = self.params.clone();
        vars.insert("task_description".into(), self.task.clone());
        vars.insert(
            "tools_documentation".into(),
            tools_documentation(&registry.descriptors()),
        );
        vars.insert("completion_marker".into(), self.completion_marker.clone());

        let (schema, section) = match &self.result_schema {
            Some(schema) => {
                let pretty = pretty_json(schema);
                let section = format!(
                    "Expected result format:\n```json\n{pretty}\n```\n\nEach <RESULT> must contain a single object matching this schema."
                );
                (pretty, section)
            }
            None => (String::new(), String::new()),
        };
        vars.insert("result_schema".into(), schema);
        vars.insert("result_schema_section".into(), section);

        substitute(&self.template, &vars).trim_end().to_string()
    }
}

/// Replace `{{name}}` placeholders (surrounding whitespace allowed) with
/// values from `vars`. Unknown names are kept verbatim.
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };

        let name = after[..close].trim();
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => {
                debug!(placeholder = name, "Unknown template placeholder");
                out.push_str(&rest[open..open + 2 + close + 2]);
            }
        }
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    out
}

/// Markdown documentation for a set of tools.
pub fn tools_documentation(tools: &[ToolDescriptor]) -> String {
    if tools.is_empty() {
        return "No tools are currently available.".into();
    }

    let mut doc = String::from("## Available Tools\n\nYou have access to the following tools:\n");
    for tool in tools {
        doc.push_str(&format!(
            "\n### Tool: {alias}\n**Name**: {name}\n**Description**: {description}\n\n**Usage**:\n```\n{usage}\n```\n\n**Input Schema**:\n```json\n{schema}\n```\n\n**Required Fields**: {required}\n**Output**: {output}\n",
            alias = tool.alias,
            name = tool.name,
            description = tool.long_description,
            usage = usage_example(tool),
            schema = pretty_json(&tool.input_schema),
            required = required_list(tool),
            output = tool.short_description,
        ));
    }
    doc
}

/// System notice appended when a tool is registered mid-conversation.
pub fn tool_introduction(tool: &ToolDescriptor) -> String {
    format!(
        "NEW TOOL AVAILABLE: {name}\n\nDescription: {description}\nAlias: {alias}\n\nUsage:\n{usage}\n\nInput Schema:\n{schema}\n\nRequired fields: {required}",
        name = tool.name,
        description = tool.long_description,
        alias = tool.alias,
        usage = usage_example(tool),
        schema = pretty_json(&tool.input_schema),
        required = required_list(tool),
    )
}

/// System notice appended when a tool is unregistered mid-conversation.
pub fn tool_removal(alias: &str, name: &str) -> String {
    format!(
        "TOOL REMOVED: {name}\n\nThe tool '{alias}' is no longer available. Do not attempt to use it."
    )
}

fn usage_example(tool: &ToolDescriptor) -> String {
    let call = serde_json::json!({
        "tool": tool.alias,
        "input": Value::Object(tool.example_input.clone()),
    });
    format!("<TOOL>\n{}\n</TOOL>", pretty_json(&call))
}

fn required_list(tool: &ToolDescriptor) -> String {
    let required = tool.required_fields();
    if required.is_empty() {
        "None".into()
    } else {
        required.join(", ")
    }
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
