//! Configuration loading and validation for reagent.
//!
//! Loads an [`AgentConfig`] from a TOML file with environment variable
//! overrides. Every field has a default, so an empty or missing file yields a
//! working configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Budget and termination settings
    #[serde(default, rename = "loop")]
    pub run: LoopConfig,

    /// Tool executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// History compaction settings
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// System prompt settings
    #[serde(default)]
    pub prompt: PromptConfig,

    /// JSON Schema every extracted result must satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Wall-clock budget for one run, checked between iterations
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Cumulative token budget for one run
    #[serde(default = "default_token_limit")]
    pub token_limit: u64,

    /// Expected size of one response; drives compaction
    #[serde(default = "default_max_tokens_per_response")]
    pub max_tokens_per_response: u64,

    /// Hard ceiling on iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Substring that marks the task as complete
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,
}

fn default_timeout_secs() -> u64 {
    300
}
fn default_token_limit() -> u64 {
    100_000
}
fn default_max_tokens_per_response() -> u64 {
    4000
}
fn default_max_iterations() -> u32 {
    50
}
fn default_completion_marker() -> String {
    "TASK_COMPLETE".into()
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            token_limit: default_token_limit(),
            max_tokens_per_response: default_max_tokens_per_response(),
            max_iterations: default_max_iterations(),
            completion_marker: default_completion_marker(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound on concurrently running tool calls
    #[serde(default = "default_max_parallel_tools")]
    pub max_parallel_tools: usize,
}

fn default_max_parallel_tools() -> usize {
    5
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tools: default_max_parallel_tools(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Messages kept verbatim at the end of the conversation
    #[serde(default = "default_recent_tail")]
    pub recent_tail: usize,

    /// Conversations this short are never compacted
    #[serde(default = "default_min_messages")]
    pub min_messages: usize,

    /// Compact once estimated tokens exceed this multiple of `max_tokens_per_response`
    #[serde(default = "default_threshold_multiplier")]
    pub threshold_multiplier: u64,
}

fn default_recent_tail() -> usize {
    6
}
fn default_min_messages() -> usize {
    10
}
fn default_threshold_multiplier() -> u64 {
    2
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            recent_tail: default_recent_tail(),
            min_messages: default_min_messages(),
            threshold_multiplier: default_threshold_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Replaces the built-in system prompt template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_template: Option<String>,

    /// Extra `{{name}}` substitutions for the template
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl AgentConfig {
    /// Load configuration from a file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config = Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `REAGENT_*` environment variable overrides.
    ///
    /// - `REAGENT_TIMEOUT_SECS`
    /// - `REAGENT_TOKEN_LIMIT`
    /// - `REAGENT_MAX_ITERATIONS`
    /// - `REAGENT_COMPLETION_MARKER`
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("REAGENT_TIMEOUT_SECS") {
            self.run.timeout_secs = parse_override("REAGENT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("REAGENT_TOKEN_LIMIT") {
            self.run.token_limit = parse_override("REAGENT_TOKEN_LIMIT", &v)?;
        }
        if let Some(v) = lookup("REAGENT_MAX_ITERATIONS") {
            self.run.max_iterations = parse_override("REAGENT_MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = lookup("REAGENT_COMPLETION_MARKER") {
            self.run.completion_marker = v;
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "loop.timeout_secs must be > 0".into(),
            ));
        }
        if self.run.token_limit == 0 {
            return Err(ConfigError::ValidationError(
                "loop.token_limit must be > 0".into(),
            ));
        }
        if self.run.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "loop.max_iterations must be > 0".into(),
            ));
        }
        if self.run.completion_marker.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "loop.completion_marker must not be blank".into(),
            ));
        }
        if self.executor.max_parallel_tools == 0 {
            return Err(ConfigError::ValidationError(
                "executor.max_parallel_tools must be > 0".into(),
            ));
        }
        if let Some(schema) = &self.result_schema
            && !schema.is_object()
        {
            return Err(ConfigError::ValidationError(
                "result_schema must be a table".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            run: LoopConfig::default(),
            executor: ExecutorConfig::default(),
            compaction: CompactionConfig::default(),
            prompt: PromptConfig::default(),
            result_schema: None,
        }
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{key} has an invalid value: '{value}'"))
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for reagent_core::Error {
    fn from(err: ConfigError) -> Self {
        reagent_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.run.max_iterations, 50);
        assert_eq!(config.run.completion_marker, "TASK_COMPLETE");
        assert_eq!(config.executor.max_parallel_tools, 5);
    }

    #[test]
    fn config_roundtrip_toml() {
        let toml_str = AgentConfig::default_toml();
        assert!(toml_str.contains("[loop]"));
        let parsed = AgentConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, AgentConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config = AgentConfig::from_toml_str(
            r#"
[loop]
max_iterations = 12

[prompt]
system_prompt_template = "Task: {{task_description}}"
params = { audience = "analysts" }
"#,
        )
        .unwrap();
        assert_eq!(config.run.max_iterations, 12);
        assert_eq!(config.run.token_limit, 100_000);
        assert_eq!(config.compaction.recent_tail, 6);
        assert_eq!(config.prompt.params["audience"], "analysts");
    }

    #[test]
    fn result_schema_from_toml() {
        let config = AgentConfig::from_toml_str(
            r#"
[result_schema]
type = "object"
required = ["answer"]

[result_schema.properties.answer]
type = "number"
"#,
        )
        .unwrap();
        let schema = config.result_schema.unwrap();
        assert_eq!(schema["properties"]["answer"]["type"], "number");
        assert_eq!(schema["required"][0], "answer");
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = AgentConfig::default();
        config.run.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn blank_marker_rejected() {
        let err = AgentConfig::from_toml_str("[loop]\ncompletion_marker = \"  \"").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("REAGENT_MAX_ITERATIONS", "7"),
            ("REAGENT_COMPLETION_MARKER", "DONE"),
        ]);
        let mut config = AgentConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.run.max_iterations, 7);
        assert_eq!(config.run.completion_marker, "DONE");
        assert_eq!(config.run.timeout_secs, 300);
    }

    #[test]
    fn invalid_env_override_rejected() {
        let mut config = AgentConfig::default();
        let err = config
            .apply_overrides(|k| (k == "REAGENT_TOKEN_LIMIT").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("REAGENT_TOKEN_LIMIT"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AgentConfig::load_from(Path::new("/nonexistent/reagent.toml")).unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor]\nmax_parallel_tools = 2").unwrap();
        let config = AgentConfig::load_from(file.path()).unwrap();
        assert_eq!(config.executor.max_parallel_tools, 2);
    }

    #[test]
    fn parse_error_names_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[loop\nbroken").unwrap();
        let err = AgentConfig::load_from(file.path()).unwrap_err();
        match err {
            ConfigError::ParseError { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
