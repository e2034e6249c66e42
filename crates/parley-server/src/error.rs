//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use parley_agent::AgentError;
use parley_mcp::{McpError, ToolCallResponse};
use parley_types::RequestError;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The request body is malformed or missing required fields.
    #[error("{0}")]
    BadRequest(String),

    /// The generation request failed before its stream opened.
    #[error("{0}")]
    Agent(#[from] AgentError),

    /// A tool-proxy call failed. Rendered in the proxy response shape.
    #[error("{0}")]
    Tool(#[from] McpError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RequestError> for ServerError {
    fn from(e: RequestError) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Agent(AgentError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            ServerError::Agent(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Tool(e) => StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "Server error");
        } else {
            tracing::warn!(status = %status, error = %message, "Client error");
        }

        match self {
            ServerError::Tool(_) => (status, Json(ToolCallResponse::failure(message))).into_response(),
            _ => (status, Json(ErrorResponse { error: message })).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_llm::LlmError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServerError::from(RequestError::MissingModelId).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::from(AgentError::config("no key")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::from(AgentError::from(LlmError::Network("refused".into()))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::from(McpError::upstream(422, "bad args")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServerError::from(McpError::invalid_request("Missing serverBaseUrl or toolName"))
                .status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_request_error_message_is_kept() {
        let err = ServerError::from(RequestError::MissingMessages);
        assert_eq!(err.to_string(), "Messages are required");
    }
}
