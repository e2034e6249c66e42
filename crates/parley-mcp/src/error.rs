//! Error types for tool invocation.

use thiserror::Error;

/// Result type for tool invocation.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for tool invocation.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to reach the tool server.
    #[error("transport error: {0}")]
    Transport(String),

    /// The tool server answered with a non-success status.
    #[error("tool server error: {status} - {body}")]
    UpstreamStatus {
        /// HTTP status returned by the tool server.
        status: u16,
        /// Error message extracted from the response body.
        body: String,
    },

    /// A remote proxy reported the call as failed.
    #[error("tool call failed: {0}")]
    ToolFailed(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The call request itself is unusable.
    #[error("{0}")]
    InvalidRequest(String),
}

impl McpError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Build an upstream error from a raw response body.
    ///
    /// A JSON body with a `message` field contributes that field; any other
    /// body is used verbatim. An empty body falls back to the status reason.
    pub fn upstream(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| body.trim().to_string());
        let body = if message.is_empty() {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown Status")
                .to_string()
        } else {
            message
        };
        Self::UpstreamStatus { status, body }
    }

    /// HTTP status a proxy endpoint should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::UpstreamStatus { status, .. } if (400..600).contains(status) => *status,
            _ => 500,
        }
    }
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
