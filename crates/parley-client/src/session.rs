//! Chat sessions and how stream chunks change them.

use serde::{Deserialize, Serialize};

use parley_types::{
    ChatStreamChunk, ChunkError, Message, MessageContent, Timestamp, ToolCallState, ToolCallStatus,
    new_id, now,
};

/// One chat session as the consumer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
    /// A request for this session is in flight.
    pub loading: bool,
    /// Error not bound to any message.
    pub error: Option<String>,
    pub created_at: Timestamp,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(new_id())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            loading: false,
            error: None,
            created_at: now(),
        }
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Messages to send as history with the next request.
    ///
    /// Replies that carry an error after delivering content stay in; only
    /// error placeholders with nothing delivered are left out.
    pub fn history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| !is_error_placeholder(m))
            .cloned()
            .collect()
    }
}

fn is_error_placeholder(msg: &Message) -> bool {
    msg.error.is_some() && msg.text().is_empty() && !msg.has_tool_calls()
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a chunk changed the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    Ignored,
}

/// Apply one chunk to a session.
///
/// Chunks for a message that was never started are ignored, as is a
/// repeated `message_start`.
pub fn apply_chunk(session: &mut Session, chunk: &ChatStreamChunk) -> Applied {
    if let ChatStreamChunk::MessageStart { id, message } = chunk {
        if session.message(id).is_some() {
            tracing::debug!(message_id = %id, "Ignoring repeated message_start");
            return Applied::Ignored;
        }
        let mut msg = Message::assistant(message.chat_id.clone(), MessageContent::Text(String::new()));
        msg.id = id.clone();
        msg.role = message.role;
        msg.created_at = message.created_at;
        msg.is_loading = true;
        session.messages.push(msg);
        session.loading = true;
        return Applied::Updated;
    }

    if let ChatStreamChunk::Error { id, error } = chunk {
        let text = error_text(error);
        match session.message_mut(id) {
            Some(msg) => {
                msg.error = Some(text);
                msg.is_loading = false;
            }
            None => session.error = Some(text),
        }
        session.loading = false;
        return Applied::Updated;
    }

    let Some(msg) = session.message_mut(chunk.id()) else {
        tracing::debug!(
            message_id = %chunk.id(),
            kind = chunk.kind(),
            "Ignoring chunk for unknown message"
        );
        return Applied::Ignored;
    };

    match chunk {
        ChatStreamChunk::ContentDelta { content, .. } => {
            msg.append_text(content);
            msg.is_loading = false;
        }
        ChatStreamChunk::ToolCalls { tool_calls, .. } => {
            if msg.tool_calls.is_some() {
                tracing::debug!(message_id = %msg.id, "Tool calls already recorded");
                return Applied::Ignored;
            }
            msg.tool_calls = Some(tool_calls.clone());
        }
        ChatStreamChunk::ToolCallStart {
            tool_call_id,
            tool_name,
            server_name,
            ..
        } => {
            msg.upsert_tool_status(ToolCallStatus {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                server_name: server_name.clone(),
                status: ToolCallState::Calling,
                result: None,
                error: None,
                timestamp: now(),
            });
        }
        ChatStreamChunk::ToolCallResult {
            tool_call_id,
            result,
            ..
        } => {
            let mut status = settled_status(msg, tool_call_id, ToolCallState::Success);
            status.result = Some(result.clone());
            msg.upsert_tool_status(status);
        }
        ChatStreamChunk::ToolCallError {
            tool_call_id,
            error,
            ..
        } => {
            let mut status = settled_status(msg, tool_call_id, ToolCallState::Error);
            status.error = Some(error.clone());
            msg.upsert_tool_status(status);
        }
        ChatStreamChunk::Thinking { thinking, .. } => {
            msg.is_loading = *thinking;
        }
        ChatStreamChunk::MessageEnd { .. } => {
            msg.is_loading = false;
            msg.updated_at = Some(now());
            // A message with tool calls is followed by a continuation.
            if !msg.has_tool_calls() {
                session.loading = false;
            }
        }
        ChatStreamChunk::MessageStart { .. } | ChatStreamChunk::Error { .. } => {}
    }
    Applied::Updated
}

/// The record a result or error replaces, keeping the names from the start.
fn settled_status(msg: &Message, tool_call_id: &str, state: ToolCallState) -> ToolCallStatus {
    let (tool_name, server_name) = msg
        .tool_status(tool_call_id)
        .map(|s| (s.tool_name.clone(), s.server_name.clone()))
        .unwrap_or_default();
    ToolCallStatus {
        tool_call_id: tool_call_id.to_string(),
        tool_name,
        server_name,
        status: state,
        result: None,
        error: None,
        timestamp: now(),
    }
}

fn error_text(error: &ChunkError) -> String {
    match &error.details {
        Some(details) if !details.is_empty() => format!("{}\n{}", error.message, details),
        _ => error.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::{Role, ToolCall};

    fn started(id: &str) -> Session {
        let mut session = Session::with_id("s1");
        apply_chunk(&mut session, &ChatStreamChunk::message_start(id, "s1"));
        session
    }

    #[test]
    fn test_message_start_creates_loading_message() {
        let session = started("m1");
        assert!(session.loading);
        let msg = session.message("m1").unwrap();
        assert!(msg.is_loading);
        assert_eq!(msg.text(), "");
    }

    #[test]
    fn test_delta_without_start_is_ignored() {
        let mut session = Session::with_id("s1");
        let applied = apply_chunk(&mut session, &ChatStreamChunk::content_delta("ghost", "boo"));
        assert_eq!(applied, Applied::Ignored);
        assert!(session.messages.is_empty());
    }

    #[test]
    fn test_duplicate_start_keeps_one_message() {
        let mut session = started("m1");
        apply_chunk(&mut session, &ChatStreamChunk::content_delta("m1", "hi"));
        let applied = apply_chunk(&mut session, &ChatStreamChunk::message_start("m1", "s1"));
        assert_eq!(applied, Applied::Ignored);
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].text(), "hi");
    }

    #[test]
    fn test_delta_clears_message_loading() {
        let mut session = started("m1");
        apply_chunk(&mut session, &ChatStreamChunk::content_delta("m1", "Hel"));
        apply_chunk(&mut session, &ChatStreamChunk::content_delta("m1", "lo"));
        let msg = session.message("m1").unwrap();
        assert_eq!(msg.text(), "Hello");
        assert!(!msg.is_loading);
        assert!(session.loading);
    }

    #[test]
    fn test_message_end_with_tool_calls_keeps_session_loading() {
        let mut session = started("m1");
        apply_chunk(
            &mut session,
            &ChatStreamChunk::tool_calls("m1", vec![ToolCall::new("c1", "calc_add", "{}")]),
        );
        apply_chunk(&mut session, &ChatStreamChunk::message_end("m1"));
        assert!(session.loading);

        apply_chunk(&mut session, &ChatStreamChunk::message_start("m2", "s1"));
        apply_chunk(&mut session, &ChatStreamChunk::content_delta("m2", "3"));
        apply_chunk(&mut session, &ChatStreamChunk::message_end("m2"));
        assert!(!session.loading);
    }

    #[test]
    fn test_tool_status_upserts_in_place() {
        let mut session = started("m1");
        apply_chunk(
            &mut session,
            &ChatStreamChunk::tool_call_start("m1", "c1", "calc_add", "Calculator"),
        );
        apply_chunk(
            &mut session,
            &ChatStreamChunk::tool_call_start("m1", "c2", "calc_mul", "Calculator"),
        );
        apply_chunk(&mut session, &ChatStreamChunk::tool_call_result("m1", "c1", "3"));
        apply_chunk(&mut session, &ChatStreamChunk::tool_call_error("m1", "c2", "boom"));

        let statuses = &session.message("m1").unwrap().tool_call_statuses;
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].tool_call_id, "c1");
        assert_eq!(statuses[0].status, ToolCallState::Success);
        assert_eq!(statuses[0].result.as_deref(), Some("3"));
        assert_eq!(statuses[0].server_name, "Calculator");
        assert_eq!(statuses[1].status, ToolCallState::Error);
        assert_eq!(statuses[1].error.as_deref(), Some("boom"));
        assert_eq!(statuses[1].tool_name, "calc_mul");
    }

    #[test]
    fn test_result_without_start_still_recorded() {
        let mut session = started("m1");
        apply_chunk(&mut session, &ChatStreamChunk::tool_call_result("m1", "c9", "{}"));
        let status = session.message("m1").unwrap().tool_status("c9").unwrap();
        assert_eq!(status.status, ToolCallState::Success);
        assert!(status.tool_name.is_empty());
    }

    #[test]
    fn test_error_binds_to_message_or_session() {
        let mut session = started("m1");
        apply_chunk(
            &mut session,
            &ChatStreamChunk::error_with_details("m1", "bad output", "/x: wrong type"),
        );
        assert_eq!(
            session.message("m1").unwrap().error.as_deref(),
            Some("bad output\n/x: wrong type")
        );
        assert!(!session.loading);
        assert!(session.error.is_none());

        session.loading = true;
        apply_chunk(&mut session, &ChatStreamChunk::error("unstarted", "provider down"));
        assert_eq!(session.error.as_deref(), Some("provider down"));
        assert!(!session.loading);
    }

    #[test]
    fn test_thinking_sets_message_loading() {
        let mut session = started("m1");
        apply_chunk(&mut session, &ChatStreamChunk::content_delta("m1", "x"));
        apply_chunk(&mut session, &ChatStreamChunk::thinking("m1", true));
        assert!(session.message("m1").unwrap().is_loading);
    }

    #[test]
    fn test_history_skips_error_placeholders() {
        let mut session = Session::with_id("s1");
        session.messages.push(Message::user("s1", "hi"));
        let mut failed = Message::assistant("s1", "");
        failed.error = Some("Model ID is required".into());
        session.messages.push(failed);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_history_keeps_reply_with_advisory_error() {
        let mut session = Session::with_id("s1");
        session.messages.push(Message::user("s1", "give me json"));
        apply_chunk(&mut session, &ChatStreamChunk::message_start("m1", "s1"));
        apply_chunk(&mut session, &ChatStreamChunk::content_delta("m1", r#"{"x":"one"}"#));
        apply_chunk(
            &mut session,
            &ChatStreamChunk::error_with_details(
                "m1",
                "model output does not conform to the JSON schema",
                "/x: \"one\" is not of type \"number\"",
            ),
        );
        apply_chunk(&mut session, &ChatStreamChunk::message_end("m1"));
        assert!(session.message("m1").unwrap().error.is_some());

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].text(), r#"{"x":"one"}"#);
    }
}
