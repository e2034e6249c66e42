//! Error types for the agent crate.

use parley_llm::LlmError;
use parley_mcp::McpError;
use parley_types::ChatStreamChunk;
use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that end a generation request before any chunk is produced.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No resolvable credential or base URL, or an unusable setting.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request cannot be served as given.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider failed before its stream opened.
    #[error("Provider error: {0}")]
    Provider(LlmError),
}

impl AgentError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Config(msg) => Self::Config(msg),
            LlmError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            other => Self::Provider(other),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Invocation Errors
// ─────────────────────────────────────────────────────────────────────────────

/// A single tool call failed. Never fatal to the turn.
#[derive(Debug, Error)]
pub enum ToolInvocationError {
    #[error("Invalid tool name '{0}'")]
    InvalidName(String),

    #[error("Tool server '{0}' is not available")]
    UnknownServer(String),

    #[error("Tool '{tool}' not found on server '{server}'")]
    UnknownTool { server: String, tool: String },

    #[error("Invalid tool arguments: {0}")]
    MalformedArguments(String),

    #[error(transparent)]
    Proxy(#[from] McpError),
}

impl ToolInvocationError {
    /// Tool-result message content reporting this failure to the model.
    pub fn to_result_content(&self) -> String {
        serde_json::json!({ "error": self.to_string() }).to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Structured output did not satisfy the requested schema. Advisory only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no valid JSON found in model output")]
    NoJson { raw_prefix: String },

    #[error("model output does not conform to the JSON schema")]
    Schema { violations: Vec<String> },

    #[error("invalid JSON schema")]
    InvalidSchema(String),
}

impl ValidationError {
    pub fn details(&self) -> String {
        match self {
            Self::NoJson { raw_prefix } => {
                format!("raw output (first 200 chars): {}", raw_prefix)
            }
            Self::Schema { violations } => violations.join("; "),
            Self::InvalidSchema(reason) => reason.clone(),
        }
    }

    /// The in-band `error` chunk reporting this failure.
    pub fn to_chunk(&self, message_id: &str) -> ChatStreamChunk {
        ChatStreamChunk::error_with_details(message_id, self.to_string(), self.details())
    }
}
