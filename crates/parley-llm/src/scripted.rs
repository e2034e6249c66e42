//! A scripted adapter for deterministic tests.
//!
//! Plays back pre-configured turns in order and records every request, so
//! orchestration can be exercised without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use parley_types::{ChatStreamChunk, ToolCall};

use crate::adapter::{
    AdapterConfig, ChunkStream, CompletionRequest, ProviderAdapter, SharedAdapter, StreamContext,
};
use crate::error::{LlmError, Result};
use crate::registry::AdapterFactory;
use crate::tools::ToolSpec;

/// One scripted provider round.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Stream text deltas, then report tool calls if any.
    Reply {
        deltas: Vec<String>,
        tool_calls: Vec<ToolCall>,
    },
    /// Fail to open the stream.
    OpenError(String),
    /// Stream some deltas, then fail mid-stream.
    StreamError { deltas: Vec<String>, message: String },
}

impl ScriptedTurn {
    /// A plain text reply delivered as one delta.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Reply {
            deltas: vec![text.into()],
            tool_calls: Vec::new(),
        }
    }

    /// A text reply delivered in several deltas.
    pub fn deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Reply {
            deltas: deltas.into_iter().map(Into::into).collect(),
            tool_calls: Vec::new(),
        }
    }

    /// A turn that ends by requesting tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::Reply {
            deltas: Vec::new(),
            tool_calls: calls,
        }
    }
}

/// Adapter that replays [`ScriptedTurn`]s.
#[derive(Debug)]
pub struct ScriptedAdapter {
    name: String,
    turns: Mutex<VecDeque<ScriptedTurn>>,
    request_log: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedAdapter {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            name: "scripted".to_string(),
            turns: Mutex::new(turns.into()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Get all requests made to this adapter.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.request_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// A registry factory that always hands out this adapter.
    pub fn factory(self: &Arc<Self>) -> AdapterFactory {
        let adapter = Arc::clone(self);
        Arc::new(move |_config: AdapterConfig| -> Result<SharedAdapter> {
            Ok(adapter.clone())
        })
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn map_history(&self, request: &CompletionRequest) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&request.messages)?)
    }

    fn map_tools(&self, tools: &[ToolSpec]) -> Option<serde_json::Value> {
        if tools.is_empty() {
            return None;
        }
        Some(serde_json::Value::Array(
            tools
                .iter()
                .map(|t| serde_json::Value::String(t.name.clone()))
                .collect(),
        ))
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        ctx: &StreamContext,
    ) -> Result<ChunkStream> {
        self.request_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let turn = self
            .turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| {
                LlmError::Backend("ScriptedAdapter: no more turns available".to_string())
            })?;

        let id = ctx.message_id.as_str();
        let mut items: Vec<Result<ChatStreamChunk>> =
            vec![Ok(ChatStreamChunk::message_start(id, ctx.chat_id.as_str()))];

        match turn {
            ScriptedTurn::OpenError(message) => return Err(LlmError::Backend(message)),
            ScriptedTurn::StreamError { deltas, message } => {
                items.extend(
                    deltas
                        .into_iter()
                        .map(|d| Ok(ChatStreamChunk::content_delta(id, d))),
                );
                items.push(Err(LlmError::Network(message)));
            }
            ScriptedTurn::Reply { deltas, tool_calls } => {
                items.extend(
                    deltas
                        .into_iter()
                        .map(|d| Ok(ChatStreamChunk::content_delta(id, d))),
                );
                if !tool_calls.is_empty() {
                    items.push(Ok(ChatStreamChunk::tool_calls(id, tool_calls)));
                }
                items.push(Ok(ChatStreamChunk::message_end(id)));
            }
        }

        Ok(Box::pin(futures::stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use parley_types::Message;

    #[tokio::test]
    async fn test_replays_turns_in_order() {
        let adapter = ScriptedAdapter::new(vec![
            ScriptedTurn::deltas(["Hel", "lo"]),
            ScriptedTurn::OpenError("down".into()),
        ]);
        let request = CompletionRequest::new("m", vec![Message::user("c", "hi")]);
        let ctx = StreamContext::new("m1", "c");

        let chunks: Vec<_> = adapter
            .stream_completion(&request, &ctx)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 4);

        assert!(adapter.stream_completion(&request, &ctx).await.is_err());
        assert!(adapter.stream_completion(&request, &ctx).await.is_err());
        assert_eq!(adapter.request_count(), 3);
    }
}
