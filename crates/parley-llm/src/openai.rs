//! OpenAI-compatible chat-completions adapter.
//!
//! Serves OpenAI itself plus any endpoint speaking the same protocol
//! (SiliconFlow, local servers, other custom deployments).

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};

use parley_types::{ChatStreamChunk, ContentPart, Message, MessageContent, Role, ToolCall};

use crate::accumulator::ToolCallAccumulator;
use crate::adapter::{
    AdapterConfig, ChunkStream, CompletionRequest, ProviderAdapter, RoundParser, Step,
    StreamContext, drive_round,
};
use crate::error::{LlmError, Result};
use crate::sse::{SseFrame, sse_frames};
use crate::tools::ToolSpec;

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible API adapter.
pub struct OpenAiAdapter {
    client: Client,
    config: AdapterConfig,
}

impl OpenAiAdapter {
    /// Create a new adapter with the given configuration.
    pub fn new(config: AdapterConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    /// Build the chat completions endpoint URL.
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    /// Add authentication headers to a request.
    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(header::CONTENT_TYPE, "application/json");

        if let Some(ref api_key) = self.config.api_key {
            builder.header(header::AUTHORIZATION, format!("Bearer {}", api_key))
        } else {
            builder
        }
    }

    fn to_openai_messages(request: &CompletionRequest) -> Vec<OpenAiMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if let Some(ref system) = request.system {
            messages.push(OpenAiMessage::text("system", system.clone()));
        }

        for m in &request.messages {
            let message = match m.role {
                Role::Tool => OpenAiMessage {
                    role: "tool",
                    content: Some(OpenAiContent::Text(m.text())),
                    tool_calls: None,
                    tool_call_id: m.tool_call_id.clone(),
                },
                Role::Assistant if m.has_tool_calls() => {
                    let text = m.text();
                    OpenAiMessage {
                        role: "assistant",
                        content: (!text.is_empty()).then_some(OpenAiContent::Text(text)),
                        tool_calls: m.tool_calls.clone(),
                        tool_call_id: None,
                    }
                }
                role => OpenAiMessage {
                    role: role.as_str(),
                    content: Some(to_openai_content(m)),
                    tool_calls: None,
                    tool_call_id: None,
                },
            };
            messages.push(message);
        }

        messages
    }

    fn build_body(&self, request: &CompletionRequest) -> OpenAiChatRequest {
        OpenAiChatRequest {
            model: request.model.clone(),
            messages: Self::to_openai_messages(request),
            stream: request.stream,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            max_tokens: request.params.max_tokens,
            stop: (!request.stop.is_empty()).then(|| request.stop.clone()),
            tools: to_openai_tools(&request.tools),
        }
    }

    async fn complete_once(
        &self,
        body: &OpenAiChatRequest,
        ctx: &StreamContext,
    ) -> Result<ChunkStream> {
        let response = self
            .config
            .send(|| self.add_headers(self.client.post(self.completions_url())).json(body))
            .await?;

        let text = response.text().await?;
        let parsed: OpenAiChatResponse = serde_json::from_str(&text)?;
        Ok(Box::pin(futures::stream::iter(
            completion_to_chunks(parsed, ctx).into_iter().map(Ok),
        )))
    }
}

fn to_openai_content(message: &Message) -> OpenAiContent {
    match &message.content {
        None => OpenAiContent::Text(String::new()),
        Some(MessageContent::Text(text)) => OpenAiContent::Text(text.clone()),
        Some(MessageContent::Parts(parts)) => OpenAiContent::Parts(
            parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => OpenAiContentPart::Text { text: text.clone() },
                    ContentPart::Image { src, .. } => OpenAiContentPart::ImageUrl {
                        image_url: OpenAiImageUrl { url: src.clone() },
                    },
                })
                .collect(),
        ),
    }
}

fn to_openai_tools(tools: &[ToolSpec]) -> Option<Vec<OpenAiTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|t| OpenAiTool {
                tool_type: "function",
                function: OpenAiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect(),
    )
}

/// Express a whole non-streaming completion as one round of chunks.
fn completion_to_chunks(response: OpenAiChatResponse, ctx: &StreamContext) -> Vec<ChatStreamChunk> {
    let id = ctx.message_id.as_str();
    let mut chunks = vec![ChatStreamChunk::message_start(id, ctx.chat_id.as_str())];

    if let Some(choice) = response.choices.into_iter().next() {
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            chunks.push(ChatStreamChunk::content_delta(id, text));
        }
        let calls = choice.message.tool_calls.unwrap_or_default();
        if choice.finish_reason.as_deref() == Some("tool_calls") && !calls.is_empty() {
            chunks.push(ChatStreamChunk::tool_calls(id, calls));
        } else if !calls.is_empty() {
            tracing::warn!(
                finish_reason = ?choice.finish_reason,
                discarded = calls.len(),
                "Tool calls present without tool_calls finish reason; discarding"
            );
        }
    }

    chunks.push(ChatStreamChunk::message_end(id));
    chunks
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn map_history(&self, request: &CompletionRequest) -> Result<serde_json::Value> {
        let messages = serde_json::to_value(Self::to_openai_messages(request))?;
        Ok(serde_json::json!({ "messages": messages }))
    }

    fn map_tools(&self, tools: &[ToolSpec]) -> Option<serde_json::Value> {
        to_openai_tools(tools).and_then(|t| serde_json::to_value(t).ok())
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        ctx: &StreamContext,
    ) -> Result<ChunkStream> {
        let body = self.build_body(request);

        tracing::debug!(
            backend = %self.config.name,
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            stream = body.stream,
            "Sending OpenAI-compatible request"
        );

        if !body.stream {
            return self.complete_once(&body, ctx).await;
        }

        let response = self
            .config
            .send(|| self.add_headers(self.client.post(self.completions_url())).json(&body))
            .await?;

        Ok(drive_round(
            ctx.clone(),
            sse_frames(response.bytes_stream()),
            OpenAiRound::default(),
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: Option<OpenAiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: &'static str, text: String) -> Self {
        Self {
            role,
            content: Some(OpenAiContent::Text(text)),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Debug, Serialize)]
struct OpenAiImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE Streaming
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct OpenAiRound {
    tool_calls: ToolCallAccumulator,
    tool_turn: bool,
}

impl RoundParser for OpenAiRound {
    fn on_frame(&mut self, frame: &SseFrame) -> Result<Step> {
        let data = frame.data.trim();
        if data == "[DONE]" {
            return Ok(Step::Done);
        }

        let chunk: OpenAiStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, data = %data, "Skipping unparseable stream frame");
                return Ok(Step::Continue);
            }
        };

        if let Some(error) = chunk.error {
            return Err(LlmError::Backend(error.message));
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(Step::Continue);
        };

        let mut text = None;
        if let Some(delta) = choice.delta {
            for tc in delta.tool_calls.unwrap_or_default() {
                let Some(index) = tc.index else {
                    continue;
                };
                let function = tc.function.unwrap_or_default();
                self.tool_calls.push(
                    index,
                    tc.id.as_deref(),
                    function.name.as_deref(),
                    function.arguments.as_deref(),
                );
            }
            text = delta.content.filter(|c| !c.is_empty());
        }

        match choice.finish_reason.as_deref() {
            Some("tool_calls") => self.tool_turn = true,
            Some(reason) if !self.tool_calls.is_empty() => {
                let discarded = self.tool_calls.discard();
                tracing::warn!(
                    finish_reason = reason,
                    discarded,
                    "Turn ended without tool_calls finish reason; discarding pending tool calls"
                );
            }
            _ => {}
        }

        Ok(text.map_or(Step::Continue, Step::Text))
    }

    fn finish(&mut self) -> Vec<ToolCall> {
        if self.tool_turn {
            return self.tool_calls.finish();
        }
        if !self.tool_calls.is_empty() {
            let discarded = self.tool_calls.discard();
            tracing::warn!(discarded, "Stream ended before tool calls completed; discarding");
        }
        Vec::new()
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    error: Option<OpenAiStreamError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: Option<OpenAiStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
