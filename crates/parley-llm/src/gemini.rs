//! Gemini `streamGenerateContent` adapter.
//!
//! Gemini wants strictly alternating `user`/`model` turns and takes the most
//! recent user message as a live prompt separate from the history. Earlier
//! turns that would break alternation are dropped, not merged.

use std::collections::HashMap;

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

// ─────────────────────────────────────────────────────────────────────────────
// Gemini Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// Gemini API adapter.
pub struct GeminiAdapter {
    client: Client,
    config: AdapterConfig,
}

impl GeminiAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, model
        )
    }

    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(header::CONTENT_TYPE, "application/json");
        match self.config.api_key {
            Some(ref key) => builder.header("x-goog-api-key", key),
            None => builder,
        }
    }

    fn to_gemini_history(request: &CompletionRequest) -> Result<GeminiHistory> {
        let live_start = request
            .messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .ok_or_else(|| {
                LlmError::InvalidRequest("Gemini requests need a user message".to_string())
            })?;

        let names = tool_names_by_call_id(&request.messages);
        let (earlier, live) = request.messages.split_at(live_start);

        let mut contents = alternate(to_turns(earlier, &names));
        contents.extend(to_turns(live, &names));

        let system_instruction = request.system.as_ref().map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart::text(text.clone())],
        });

        Ok(GeminiHistory {
            system_instruction,
            contents,
        })
    }

    fn build_body(&self, request: &CompletionRequest) -> Result<GeminiRequest> {
        let history = Self::to_gemini_history(request)?;
        Ok(GeminiRequest {
            contents: history.contents,
            system_instruction: history.system_instruction,
            generation_config: GenerationConfig {
                max_output_tokens: request.params.max_tokens,
                temperature: request.params.temperature,
                top_p: request.params.top_p,
                stop_sequences: (!request.stop.is_empty()).then(|| request.stop.clone()),
            },
            tools: to_gemini_tools(&request.tools),
        })
    }
}

/// Map each tool call id to the function name it invoked.
fn tool_names_by_call_id(messages: &[Message]) -> HashMap<&str, &str> {
    messages
        .iter()
        .flat_map(|m| m.tool_calls.iter().flatten())
        .map(|c| (c.id.as_str(), c.function.name.as_str()))
        .collect()
}

/// Convert messages to Gemini turns. A run of tool results becomes one user
/// turn of function responses.
fn to_turns(messages: &[Message], names: &HashMap<&str, &str>) -> Vec<GeminiContent> {
    let mut turns: Vec<GeminiContent> = Vec::new();
    let mut in_tool_run = false;

    for m in messages {
        let (role, parts) = match m.role {
            Role::User => ("user", user_parts(m)),
            Role::Assistant => ("model", model_parts(m)),
            Role::Tool => {
                let part = function_response(m, names);
                match turns.last_mut() {
                    Some(last) if in_tool_run => last.parts.push(part),
                    _ => turns.push(GeminiContent {
                        role: Some("user"),
                        parts: vec![part],
                    }),
                }
                in_tool_run = true;
                continue;
            }
            Role::System => continue,
        };
        in_tool_run = false;
        if parts.is_empty() {
            continue;
        }
        turns.push(GeminiContent {
            role: Some(role),
            parts,
        });
    }

    turns
}

/// Enforce strict alternation on history turns.
///
/// A turn with the same role as the previous kept turn is dropped. History
/// must open with a user turn and hand over to the live prompt (a user turn)
/// from a model turn.
fn alternate(turns: Vec<GeminiContent>) -> Vec<GeminiContent> {
    let mut kept: Vec<GeminiContent> = Vec::with_capacity(turns.len());
    for turn in turns {
        let previous = kept.last().and_then(|t| t.role);
        let dropped = match previous {
            None => turn.role != Some("user"),
            Some(role) => turn.role == Some(role),
        };
        if dropped {
            tracing::warn!(
                role = turn.role.unwrap_or_default(),
                "Dropping history turn that breaks role alternation"
            );
            continue;
        }
        kept.push(turn);
    }
    if kept.last().is_some_and(|t| t.role == Some("user")) {
        tracing::warn!("Dropping trailing user history turn before the live prompt");
        kept.pop();
    }
    kept
}

fn user_parts(message: &Message) -> Vec<GeminiPart> {
    match &message.content {
        None => Vec::new(),
        Some(MessageContent::Text(text)) if text.is_empty() => Vec::new(),
        Some(MessageContent::Text(text)) => vec![GeminiPart::text(text.clone())],
        Some(MessageContent::Parts(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(GeminiPart::text(text.clone())),
                ContentPart::Image { .. } => match part.inline_image() {
                    Some((mime_type, data)) => Some(GeminiPart {
                        inline_data: Some(InlineData {
                            mime_type,
                            data: data.to_string(),
                        }),
                        ..Default::default()
                    }),
                    None => {
                        tracing::warn!("Dropping image part that is not a data URL");
                        None
                    }
                },
            })
            .collect(),
    }
}

fn model_parts(message: &Message) -> Vec<GeminiPart> {
    let mut parts = Vec::new();
    let text = message.text();
    if !text.is_empty() {
        parts.push(GeminiPart::text(text));
    }
    for call in message.tool_calls.iter().flatten() {
        parts.push(GeminiPart {
            function_call: Some(FunctionCall {
                id: None,
                name: call.function.name.clone(),
                args: parse_object(&call.function.arguments),
            }),
            ..Default::default()
        });
    }
    parts
}

fn function_response(message: &Message, names: &HashMap<&str, &str>) -> GeminiPart {
    let call_id = message.tool_call_id.as_deref().unwrap_or_default();
    let name = names.get(call_id).copied().unwrap_or(call_id);
    let text = message.text();
    let response = match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        Ok(value) => serde_json::json!({ "result": value }),
        Err(_) => serde_json::json!({ "result": text }),
    };
    GeminiPart {
        function_response: Some(FunctionResponse {
            name: name.to_string(),
            response,
        }),
        ..Default::default()
    }
}

fn parse_object(arguments: &str) -> serde_json::Value {
    serde_json::from_str::<serde_json::Value>(arguments)
        .ok()
        .filter(|v| v.is_object())
        .unwrap_or_else(|| serde_json::json!({}))
}

fn to_gemini_tools(tools: &[ToolSpec]) -> Option<Vec<GeminiTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(vec![GeminiTool {
        function_declarations: tools
            .iter()
            .map(|t| FunctionDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect(),
    }])
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn map_history(&self, request: &CompletionRequest) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(Self::to_gemini_history(request)?)?)
    }

    fn map_tools(&self, tools: &[ToolSpec]) -> Option<serde_json::Value> {
        to_gemini_tools(tools).and_then(|t| serde_json::to_value(t).ok())
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        ctx: &StreamContext,
    ) -> Result<ChunkStream> {
        let body = self.build_body(request)?;
        let url = self.stream_url(&request.model);

        tracing::debug!(
            backend = %self.config.name,
            model = %request.model,
            contents = body.contents.len(),
            tools = body
                .tools
                .as_ref()
                .map(|t| t.iter().map(|g| g.function_declarations.len()).sum::<usize>())
                .unwrap_or(0),
            "Sending Gemini request"
        );

        let response = self
            .config
            .send(|| self.add_headers(self.client.post(&url)).json(&body))
            .await?;

        Ok(drive_round(
            ctx.clone(),
            sse_frames(response.bytes_stream()),
            GeminiRound::default(),
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiHistory {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl GeminiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE Streaming
// ─────────────────────────────────────────────────────────────────────────────

/// Function calls arrive whole; a stream that produced any ended on tool calls.
#[derive(Debug, Default)]
struct GeminiRound {
    tool_calls: ToolCallAccumulator,
}

impl RoundParser for GeminiRound {
    fn on_frame(&mut self, frame: &SseFrame) -> Result<Step> {
        let chunk: StreamChunk = match serde_json::from_str(&frame.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unparseable stream frame");
                return Ok(Step::Continue);
            }
        };

        if let Some(error) = chunk.error {
            return Err(LlmError::Backend(error.message));
        }
        if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::Backend(format!("Prompt blocked: {}", reason)));
        }

        let mut text = String::new();
        for candidate in chunk.candidates {
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
                if let Some(call) = part.function_call {
                    let id = call
                        .id
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                    let arguments = serde_json::to_string(&call.args)?;
                    self.tool_calls.push_complete(&id, &call.name, &arguments);
                }
            }
            if let Some(reason) = candidate.finish_reason.filter(|r| r != "STOP") {
                tracing::debug!(finish_reason = %reason, "Gemini candidate finished");
            }
        }

        Ok(if text.is_empty() {
            Step::Continue
        } else {
            Step::Text(text)
        })
    }

    fn finish(&mut self) -> Vec<ToolCall> {
        self.tool_calls.finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::ProviderType;
    use serde_json::json;

    fn adapter() -> GeminiAdapter {
        GeminiAdapter::new(
            AdapterConfig::new(
                ProviderType::Gemini,
                "https://generativelanguage.googleapis.com/v1beta",
            )
            .with_api_key("g-key"),
        )
        .unwrap()
    }

    fn frame(data: serde_json::Value) -> SseFrame {
        SseFrame {
            event: None,
            data: data.to_string(),
        }
    }

    fn roles(history: &serde_json::Value) -> Vec<String> {
        history["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_stream_url() {
        assert_eq!(
            adapter().stream_url("gemini-2.0-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_alternation_drops_repeated_roles() {
        let request = CompletionRequest::new(
            "gemini",
            vec![
                Message::user("c", "first"),
                Message::user("c", "second"),
                Message::assistant("c", "reply"),
                Message::assistant("c", "reply again"),
                Message::user("c", "live"),
            ],
        )
        .with_system("Be kind.");
        let history = adapter().map_history(&request).unwrap();
        assert_eq!(roles(&history), vec!["user", "model", "user"]);
        assert_eq!(history["contents"][0]["parts"][0]["text"], "first");
        assert_eq!(history["contents"][2]["parts"][0]["text"], "live");
        assert_eq!(history["systemInstruction"]["parts"][0]["text"], "Be kind.");
    }

    #[test]
    fn test_live_prompt_carries_tool_exchange() {
        let request = CompletionRequest::new(
            "gemini",
            vec![
                Message::user("c", "weather in Oslo and Bergen?"),
                Message::assistant_tool_calls(
                    "c",
                    "",
                    vec![
                        ToolCall::new("g1", "wx_forecast", r#"{"city":"Oslo"}"#),
                        ToolCall::new("g2", "wx_forecast", r#"{"city":"Bergen"}"#),
                    ],
                ),
                Message::tool_result("c", "g1", r#"{"temp":3}"#),
                Message::tool_result("c", "g2", "rainy"),
            ],
        );
        let history = adapter().map_history(&request).unwrap();
        assert_eq!(roles(&history), vec!["user", "model", "user"]);

        let calls = &history["contents"][1]["parts"];
        assert_eq!(calls[0]["functionCall"]["name"], "wx_forecast");
        assert_eq!(calls[1]["functionCall"]["args"], json!({"city": "Bergen"}));

        let responses = history["contents"][2]["parts"].as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["functionResponse"]["name"], "wx_forecast");
        assert_eq!(responses[0]["functionResponse"]["response"], json!({"temp": 3}));
        assert_eq!(
            responses[1]["functionResponse"]["response"],
            json!({"result": "rainy"})
        );
    }

    #[test]
    fn test_requires_user_message() {
        let request = CompletionRequest::new("gemini", vec![Message::assistant("c", "hi")]);
        assert!(matches!(
            adapter().map_history(&request),
            Err(LlmError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_inline_image() {
        let request = CompletionRequest::new(
            "gemini",
            vec![Message::user(
                "c",
                MessageContent::Parts(vec![ContentPart::image("data:image/png;base64,iVBOR")]),
            )],
        );
        let history = adapter().map_history(&request).unwrap();
        assert_eq!(
            history["contents"][0]["parts"][0],
            json!({"inlineData": {"mimeType": "image/png", "data": "iVBOR"}})
        );
    }

    #[test]
    fn test_generation_config_and_tools() {
        let mut request = CompletionRequest::new("gemini", vec![Message::user("c", "hi")])
            .with_stop(vec!["END".into()])
            .with_tools(vec![ToolSpec {
                name: "wx_forecast".into(),
                description: "Forecast".into(),
                parameters: json!({"type": "object"}),
            }]);
        request.params.max_tokens = Some(256);
        let body = serde_json::to_value(adapter().build_body(&request).unwrap()).unwrap();
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(body["generationConfig"]["stopSequences"], json!(["END"]));
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "wx_forecast"
        );
    }

    #[test]
    fn test_round_text_and_function_calls() {
        let mut round = GeminiRound::default();
        let step = round
            .on_frame(&frame(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Hel"}, {"text": "lo"}]}}]
            })))
            .unwrap();
        assert_eq!(step, Step::Text("Hello".into()));

        round
            .on_frame(&frame(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"functionCall": {"name": "wx_forecast", "args": {"city": "Oslo"}}}]},
                    "finishReason": "STOP"
                }]
            })))
            .unwrap();

        let calls = round.finish();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].function.arguments, r#"{"city":"Oslo"}"#);
    }

    #[test]
    fn test_round_blocked_prompt() {
        let mut round = GeminiRound::default();
        let err = round
            .on_frame(&frame(json!({"promptFeedback": {"blockReason": "SAFETY"}})))
            .unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
