//! The normalized streaming protocol.
//!
//! Every provider stream is translated into a sequence of [`ChatStreamChunk`]s
//! which travel to the consumer as newline-delimited `data: <json>` frames.
//! For a given message id at most one `message_start` and one `message_end`
//! occur, and `message_start` comes first.

use serde::{Deserialize, Serialize};

use crate::message::{Role, now};
use crate::tool::ToolCall;
use crate::Timestamp;

/// Header of a freshly started assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStartInfo {
    pub id: String,
    pub role: Role,
    pub chat_id: String,
    pub created_at: Timestamp,
}

/// Error payload of an `error` chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// One event in the normalized streaming protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamChunk {
    MessageStart {
        id: String,
        message: MessageStartInfo,
    },
    ContentDelta {
        id: String,
        role: Role,
        content: String,
    },
    ToolCalls {
        id: String,
        tool_calls: Vec<ToolCall>,
    },
    ToolCallStart {
        id: String,
        tool_call_id: String,
        tool_name: String,
        server_name: String,
    },
    ToolCallResult {
        id: String,
        tool_call_id: String,
        result: String,
    },
    ToolCallError {
        id: String,
        tool_call_id: String,
        error: String,
    },
    Thinking {
        id: String,
        thinking: bool,
    },
    MessageEnd {
        id: String,
    },
    Error {
        id: String,
        error: ChunkError,
    },
}

impl ChatStreamChunk {
    /// Start a new assistant message.
    pub fn message_start(id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let id = id.into();
        Self::MessageStart {
            message: MessageStartInfo {
                id: id.clone(),
                role: Role::Assistant,
                chat_id: chat_id.into(),
                created_at: now(),
            },
            id,
        }
    }

    pub fn content_delta(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ContentDelta {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool_calls(id: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::ToolCalls {
            id: id.into(),
            tool_calls,
        }
    }

    pub fn tool_call_start(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        server_name: impl Into<String>,
    ) -> Self {
        Self::ToolCallStart {
            id: id.into(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            server_name: server_name.into(),
        }
    }

    pub fn tool_call_result(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self::ToolCallResult {
            id: id.into(),
            tool_call_id: tool_call_id.into(),
            result: result.into(),
        }
    }

    pub fn tool_call_error(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::ToolCallError {
            id: id.into(),
            tool_call_id: tool_call_id.into(),
            error: error.into(),
        }
    }

    pub fn thinking(id: impl Into<String>, thinking: bool) -> Self {
        Self::Thinking {
            id: id.into(),
            thinking,
        }
    }

    pub fn message_end(id: impl Into<String>) -> Self {
        Self::MessageEnd { id: id.into() }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            id: id.into(),
            error: ChunkError {
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn error_with_details(
        id: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self::Error {
            id: id.into(),
            error: ChunkError {
                message: message.into(),
                details: Some(details.into()),
            },
        }
    }

    /// The owning message id.
    pub fn id(&self) -> &str {
        match self {
            Self::MessageStart { id, .. }
            | Self::ContentDelta { id, .. }
            | Self::ToolCalls { id, .. }
            | Self::ToolCallStart { id, .. }
            | Self::ToolCallResult { id, .. }
            | Self::ToolCallError { id, .. }
            | Self::Thinking { id, .. }
            | Self::MessageEnd { id }
            | Self::Error { id, .. } => id,
        }
    }

    /// Wire name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentDelta { .. } => "content_delta",
            Self::ToolCalls { .. } => "tool_calls",
            Self::ToolCallStart { .. } => "tool_call_start",
            Self::ToolCallResult { .. } => "tool_call_result",
            Self::ToolCallError { .. } => "tool_call_error",
            Self::Thinking { .. } => "thinking",
            Self::MessageEnd { .. } => "message_end",
            Self::Error { .. } => "error",
        }
    }
}

/// Encode a chunk as one `data: <json>` frame, blank-line terminated.
pub fn encode_frame(chunk: &ChatStreamChunk) -> serde_json::Result<String> {
    Ok(format!("data: {}\n\n", serde_json::to_string(chunk)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_start_shape() {
        let chunk = ChatStreamChunk::message_start("m1", "chat-9");
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "message_start");
        assert_eq!(json["id"], "m1");
        assert_eq!(json["message"]["role"], "assistant");
        assert_eq!(json["message"]["chatId"], "chat-9");
        assert!(json["message"]["createdAt"].is_string());
    }

    #[test]
    fn test_message_end_has_only_id() {
        let json = serde_json::to_value(ChatStreamChunk::message_end("m1")).unwrap();
        assert_eq!(json, json!({"type": "message_end", "id": "m1"}));
    }

    #[test]
    fn test_error_details_optional() {
        let json = serde_json::to_value(ChatStreamChunk::error("m1", "boom")).unwrap();
        assert_eq!(json["error"], json!({"message": "boom"}));

        let json = serde_json::to_value(ChatStreamChunk::error_with_details("m1", "boom", "x"))
            .unwrap();
        assert_eq!(json["error"]["details"], "x");
    }

    #[test]
    fn test_parse_inbound_frames() {
        let chunk: ChatStreamChunk = serde_json::from_str(
            r#"{"type":"tool_call_start","id":"m1","tool_call_id":"c1","tool_name":"srv_add","server_name":"Calc"}"#,
        )
        .unwrap();
        assert_eq!(chunk.id(), "m1");
        assert_eq!(chunk.kind(), "tool_call_start");

        let chunk: ChatStreamChunk =
            serde_json::from_str(r#"{"type":"thinking","id":"m1","thinking":true}"#).unwrap();
        assert_eq!(chunk, ChatStreamChunk::thinking("m1", true));
    }

    #[test]
    fn test_encode_frame() {
        let frame = encode_frame(&ChatStreamChunk::content_delta("m1", "hi")).unwrap();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
        assert!(frame.contains(r#""type":"content_delta""#));
    }
}
