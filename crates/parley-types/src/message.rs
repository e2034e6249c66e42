//! Message types for conversations and chat.

use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::tool::ToolCall;

/// Generate a new message identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC time.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// One part of a multi-part message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// An image carried as a data URL (`data:image/png;base64,...`).
    Image {
        src: String,
        #[serde(
            default,
            rename = "mediaType",
            skip_serializing_if = "Option::is_none"
        )]
        media_type: Option<String>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(src: impl Into<String>) -> Self {
        Self::Image {
            src: src.into(),
            media_type: None,
        }
    }

    /// Split an image data URL into its media type and base64 payload.
    ///
    /// Returns `None` for text parts and for images that are not data URLs.
    /// A header without a media type falls back to `image/jpeg`.
    pub fn inline_image(&self) -> Option<(String, &str)> {
        let Self::Image { src, media_type } = self else {
            return None;
        };
        let rest = src.strip_prefix("data:")?;
        let (header, data) = rest.split_once(',')?;
        let parsed = header
            .split(';')
            .next()
            .filter(|mt| !mt.is_empty())
            .map(str::to_string);
        let media = parsed
            .or_else(|| media_type.clone())
            .unwrap_or_else(|| "image/jpeg".to_string());
        Some((media, data))
    }
}

/// Message body: plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of the content, ignoring non-text parts.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Apply a transformation to every text segment, leaving images untouched.
    pub fn map_text(&mut self, mut f: impl FnMut(&str) -> String) {
        match self {
            MessageContent::Text(t) => *t = f(t),
            MessageContent::Parts(parts) => {
                for part in parts.iter_mut() {
                    if let ContentPart::Text { text } = part {
                        *text = f(text);
                    }
                }
            }
        }
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

/// Lifecycle of one tool invocation as seen by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallState {
    Calling,
    Success,
    Error,
}

/// Per-message status record for a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallStatus {
    pub tool_call_id: String,
    pub tool_name: String,
    pub server_name: String,
    pub status: ToolCallState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub chat_id: String,
    pub role: Role,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default = "now")]
    pub created_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(default, rename = "tool_calls", skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(
        default,
        rename = "tool_call_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, rename = "mcpToolCalls", skip_serializing_if = "Vec::is_empty")]
    pub tool_call_statuses: Vec<ToolCallStatus>,
}

impl Message {
    fn base(chat_id: impl Into<String>, role: Role, content: Option<MessageContent>) -> Self {
        Self {
            id: new_id(),
            chat_id: chat_id.into(),
            role,
            content,
            created_at: now(),
            updated_at: None,
            tool_calls: None,
            tool_call_id: None,
            is_loading: false,
            error: None,
            tool_call_statuses: Vec::new(),
        }
    }

    /// Create a new user message.
    pub fn user(chat_id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self::base(chat_id, Role::User, Some(content.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(chat_id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self::base(chat_id, Role::Assistant, Some(content.into()))
    }

    /// Create a new system message.
    pub fn system(chat_id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self::base(chat_id, Role::System, Some(content.into()))
    }

    /// Create an assistant turn that requested tool calls.
    pub fn assistant_tool_calls(
        chat_id: impl Into<String>,
        text: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        let text = text.into();
        let content = if text.is_empty() {
            None
        } else {
            Some(MessageContent::Text(text))
        };
        let mut msg = Self::base(chat_id, Role::Assistant, content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    /// Create a tool result message.
    pub fn tool_result(
        chat_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(chat_id, Role::Tool, Some(MessageContent::Text(content.into())));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Concatenated text content (empty when there is none).
    pub fn text(&self) -> String {
        self.content.as_ref().map(|c| c.text()).unwrap_or_default()
    }

    /// Whether this message carries a non-empty `tool_calls` list.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Append streamed text to the message body.
    pub fn append_text(&mut self, delta: &str) {
        match &mut self.content {
            None => self.content = Some(MessageContent::Text(delta.to_string())),
            Some(MessageContent::Text(t)) => t.push_str(delta),
            Some(MessageContent::Parts(parts)) => match parts.last_mut() {
                Some(ContentPart::Text { text }) => text.push_str(delta),
                _ => parts.push(ContentPart::text(delta)),
            },
        }
        self.updated_at = Some(now());
    }

    /// Insert or replace the status record for a tool call.
    ///
    /// Records are keyed by `tool_call_id`; an existing record is replaced in
    /// place so ordering reflects the first time a call was seen.
    pub fn upsert_tool_status(&mut self, status: ToolCallStatus) {
        match self
            .tool_call_statuses
            .iter_mut()
            .find(|s| s.tool_call_id == status.tool_call_id)
        {
            Some(existing) => *existing = status,
            None => self.tool_call_statuses.push(status),
        }
        self.updated_at = Some(now());
    }

    /// Look up the status record for a tool call.
    pub fn tool_status(&self, tool_call_id: &str) -> Option<&ToolCallStatus> {
        self.tool_call_statuses
            .iter()
            .find(|s| s.tool_call_id == tool_call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_names() {
        let mut msg = Message::tool_result("chat-1", "call_1", "{}");
        msg.is_loading = true;
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["chatId"], "chat-1");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["isLoading"], true);
        assert!(json.get("createdAt").is_some());
        assert!(json.get("mcpToolCalls").is_none());
    }

    #[test]
    fn test_minimal_inbound_message() {
        let msg: Message =
            serde_json::from_str(r#"{"role":"user","content":"hello"}"#).unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "hello");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_parts_content() {
        let msg: Message = serde_json::from_str(
            r#"{"role":"user","content":[{"type":"text","text":"look"},{"type":"image","src":"data:image/png;base64,AAAA"}]}"#,
        )
        .unwrap();
        assert_eq!(msg.text(), "look");
        let Some(MessageContent::Parts(parts)) = &msg.content else {
            panic!("expected parts");
        };
        assert_eq!(
            parts[1].inline_image(),
            Some(("image/png".to_string(), "AAAA"))
        );
    }

    #[test]
    fn test_inline_image_rejects_remote_urls() {
        let part = ContentPart::image("https://example.com/cat.png");
        assert!(part.inline_image().is_none());
        assert!(ContentPart::text("x").inline_image().is_none());
    }

    #[test]
    fn test_append_text() {
        let mut msg = Message::assistant("c", "");
        msg.content = None;
        msg.append_text("Hel");
        msg.append_text("lo");
        assert_eq!(msg.text(), "Hello");
    }

    #[test]
    fn test_upsert_tool_status_replaces_in_place() {
        let mut msg = Message::assistant("c", "");
        let status = |id: &str, state| ToolCallStatus {
            tool_call_id: id.to_string(),
            tool_name: "srv_search".to_string(),
            server_name: "srv".to_string(),
            status: state,
            result: None,
            error: None,
            timestamp: now(),
        };
        msg.upsert_tool_status(status("a", ToolCallState::Calling));
        msg.upsert_tool_status(status("b", ToolCallState::Calling));
        msg.upsert_tool_status(status("a", ToolCallState::Success));

        assert_eq!(msg.tool_call_statuses.len(), 2);
        assert_eq!(msg.tool_call_statuses[0].tool_call_id, "a");
        assert_eq!(msg.tool_call_statuses[0].status, ToolCallState::Success);
        assert_eq!(msg.tool_call_statuses[1].status, ToolCallState::Calling);
    }
}
