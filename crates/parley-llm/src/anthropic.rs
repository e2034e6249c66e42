//! Anthropic Messages API adapter.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};

use parley_types::{ContentPart, Message, MessageContent, Role, ToolCall};

use crate::accumulator::ToolCallAccumulator;
use crate::adapter::{
    AdapterConfig, ChunkStream, CompletionRequest, ProviderAdapter, RoundParser, Step,
    StreamContext, drive_round,
};
use crate::error::{LlmError, Result};
use crate::sse::{SseFrame, sse_frames};
use crate::tools::ToolSpec;

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory for this API.
const DEFAULT_MAX_TOKENS: u32 = 4096;

// ─────────────────────────────────────────────────────────────────────────────
// Anthropic Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// Anthropic Messages API adapter.
pub struct AnthropicAdapter {
    client: Client,
    config: AdapterConfig,
}

impl AnthropicAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    /// Build the messages endpoint URL.
    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url)
    }

    /// Add authentication and API headers to a request.
    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder
            .header("anthropic-version", API_VERSION)
            .header(header::CONTENT_TYPE, "application/json");
        match self.config.api_key {
            Some(ref key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    fn to_api_history(request: &CompletionRequest) -> Result<ApiHistory> {
        let mut messages: Vec<ApiMessage> = Vec::new();

        for m in &request.messages {
            match m.role {
                Role::User => messages.push(ApiMessage {
                    role: "user",
                    content: to_user_blocks(m),
                }),
                Role::Assistant => {
                    let blocks = to_assistant_blocks(m);
                    if !blocks.is_empty() {
                        messages.push(ApiMessage {
                            role: "assistant",
                            content: blocks,
                        });
                    }
                }
                Role::Tool => {
                    let block = ApiBlock::ToolResult {
                        tool_use_id: m.tool_call_id.clone().unwrap_or_default(),
                        content: m.text(),
                    };
                    // Consecutive results share one user message.
                    match messages.last_mut() {
                        Some(last)
                            if last.role == "user"
                                && last
                                    .content
                                    .iter()
                                    .all(|b| matches!(b, ApiBlock::ToolResult { .. })) =>
                        {
                            last.content.push(block)
                        }
                        _ => messages.push(ApiMessage {
                            role: "user",
                            content: vec![block],
                        }),
                    }
                }
                Role::System => {
                    tracing::debug!(message_id = %m.id, "Dropping system-role history entry");
                }
            }
        }

        let mut system = request.system.clone();
        if messages.is_empty() {
            match system.take() {
                Some(prompt) => messages.push(ApiMessage {
                    role: "user",
                    content: vec![ApiBlock::Text { text: prompt }],
                }),
                None => {
                    return Err(LlmError::InvalidRequest(
                        "Anthropic requests need at least one user or assistant message"
                            .to_string(),
                    ));
                }
            }
        }

        if messages.last().is_some_and(|m| m.role != "user") {
            tracing::warn!(
                last_role = messages.last().map(|m| m.role).unwrap_or_default(),
                "Last history entry is not user-authored; the provider may reject the request"
            );
        }

        Ok(ApiHistory { system, messages })
    }

    fn build_body(&self, request: &CompletionRequest) -> Result<ApiRequest> {
        let history = Self::to_api_history(request)?;
        Ok(ApiRequest {
            model: request.model.clone(),
            system: history.system,
            messages: history.messages,
            max_tokens: request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            stop_sequences: (!request.stop.is_empty()).then(|| request.stop.clone()),
            stream: true,
            tools: to_api_tools(&request.tools),
        })
    }
}

fn to_user_blocks(message: &Message) -> Vec<ApiBlock> {
    match &message.content {
        None => vec![ApiBlock::Text {
            text: String::new(),
        }],
        Some(MessageContent::Text(text)) => vec![ApiBlock::Text { text: text.clone() }],
        Some(MessageContent::Parts(parts)) => parts.iter().filter_map(to_api_part).collect(),
    }
}

fn to_api_part(part: &ContentPart) -> Option<ApiBlock> {
    match part {
        ContentPart::Text { text } => Some(ApiBlock::Text { text: text.clone() }),
        ContentPart::Image { src, .. } => {
            if let Some((media_type, data)) = part.inline_image() {
                Some(ApiBlock::Image {
                    source: ApiImageSource::Base64 {
                        media_type,
                        data: data.to_string(),
                    },
                })
            } else if src.starts_with("http://") || src.starts_with("https://") {
                Some(ApiBlock::Image {
                    source: ApiImageSource::Url { url: src.clone() },
                })
            } else {
                tracing::warn!("Dropping image part with unsupported source");
                None
            }
        }
    }
}

fn to_assistant_blocks(message: &Message) -> Vec<ApiBlock> {
    let mut blocks = Vec::new();
    let text = message.text();
    if !text.is_empty() {
        blocks.push(ApiBlock::Text { text });
    }
    for call in message.tool_calls.iter().flatten() {
        blocks.push(ApiBlock::ToolUse {
            id: call.id.clone(),
            name: call.function.name.clone(),
            input: parse_arguments(&call.function.arguments),
        });
    }
    blocks
}

/// Tool inputs must be objects; unparseable or empty arguments become `{}`.
fn parse_arguments(arguments: &str) -> serde_json::Value {
    serde_json::from_str::<serde_json::Value>(arguments)
        .ok()
        .filter(|v| v.is_object())
        .unwrap_or_else(|| serde_json::json!({}))
}

fn to_api_tools(tools: &[ToolSpec]) -> Option<Vec<ApiTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|t| ApiTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect(),
    )
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn map_history(&self, request: &CompletionRequest) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(Self::to_api_history(request)?)?)
    }

    fn map_tools(&self, tools: &[ToolSpec]) -> Option<serde_json::Value> {
        to_api_tools(tools).and_then(|t| serde_json::to_value(t).ok())
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        ctx: &StreamContext,
    ) -> Result<ChunkStream> {
        let body = self.build_body(request)?;

        tracing::debug!(
            backend = %self.config.name,
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "Sending Anthropic request"
        );

        let response = self
            .config
            .send(|| self.add_headers(self.client.post(self.messages_url())).json(&body))
            .await?;

        Ok(drive_round(
            ctx.clone(),
            sse_frames(response.bytes_stream()),
            AnthropicRound::default(),
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiHistory {
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    Image {
        source: ApiImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE Streaming
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct AnthropicRound {
    tool_calls: ToolCallAccumulator,
    tool_turn: bool,
}

impl RoundParser for AnthropicRound {
    fn on_frame(&mut self, frame: &SseFrame) -> Result<Step> {
        let event: StreamEvent = match serde_json::from_str(&frame.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    event = ?frame.event,
                    "Skipping unparseable stream frame"
                );
                return Ok(Step::Continue);
            }
        };

        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block: StartBlock::ToolUse { id, name },
            } => {
                self.tool_calls.push(index, Some(&id), Some(&name), None);
                Ok(Step::Continue)
            }
            StreamEvent::ContentBlockStart {
                content_block: StartBlock::Text { text },
                ..
            } => Ok(if text.is_empty() {
                Step::Continue
            } else {
                Step::Text(text)
            }),
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                DeltaContent::TextDelta { text } if !text.is_empty() => Ok(Step::Text(text)),
                DeltaContent::InputJsonDelta { partial_json } => {
                    self.tool_calls.push(index, None, None, Some(&partial_json));
                    Ok(Step::Continue)
                }
                _ => Ok(Step::Continue),
            },
            StreamEvent::MessageDelta { delta } => {
                match delta.stop_reason.as_deref() {
                    Some("tool_use") => self.tool_turn = true,
                    Some(reason) if !self.tool_calls.is_empty() => {
                        let discarded = self.tool_calls.discard();
                        tracing::warn!(
                            stop_reason = reason,
                            discarded,
                            "Turn ended without tool_use stop reason; discarding pending tool calls"
                        );
                    }
                    _ => {}
                }
                Ok(Step::Continue)
            }
            StreamEvent::MessageStop => Ok(Step::Done),
            StreamEvent::Error { error } => Err(match error.error_type.as_str() {
                "overloaded_error" | "rate_limit_error" => LlmError::rate_limit(error.message),
                _ => LlmError::Backend(error.message),
            }),
            StreamEvent::ContentBlockStart { .. }
            | StreamEvent::MessageStart
            | StreamEvent::ContentBlockStop
            | StreamEvent::Ping
            | StreamEvent::Unknown => Ok(Step::Continue),
        }
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
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart,
    ContentBlockStart {
        index: usize,
        content_block: StartBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: DeltaContent,
    },
    ContentBlockStop,
    MessageDelta {
        delta: MessageDelta,
    },
    MessageStop,
    Ping,
    Error {
        error: StreamErrorDetail,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeltaContent {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorDetail {
    #[serde(rename = "type", default)]
    error_type: String,
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
