//! Error types for the reagent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all reagent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Registry errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures reported by an LLM backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Backend has no more responses: {0}")]
    Exhausted(String),
}

/// Failures raised by (or on behalf of) a tool.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool '{0}' does not accept configuration")]
    NotConfigurable(String),

    #[error("Invalid tool configuration: {0}")]
    InvalidConfig(String),

    #[error("Tool '{0}' panicked during execution")]
    Panicked(String),
}

/// Failures of registry mutations. Registry state is unchanged when these are returned.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Duplicate tool aliases found: {}. Each tool must have a unique alias.", .0.join(", "))]
    DuplicateAliases(Vec<String>),

    #[error("Tool '{0}' not found")]
    UnknownAlias(String),

    #[error("Failed to reconfigure tool '{alias}': {source}")]
    Reconfigure {
        alias: String,
        #[source]
        source: ToolError,
    },
}
