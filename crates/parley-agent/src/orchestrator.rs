//! The tool orchestration loop.
//!
//! One generation request becomes one or more provider rounds. When a round
//! ends with tool calls, the calls run one at a time, their results are
//! appended to the history, and the provider is asked to continue under a
//! fresh message id.
//!
//! ```text
//! provider stream ──► content / tool_calls ──► tools (sequential)
//!        ▲                                          │
//!        └──────────── history + results ◄──────────┘
//! ```
//!
//! Per message the chunk order is `message_start`, `content_delta`*,
//! `tool_calls`, per-call status, `thinking`, `message_end`.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use parley_llm::{
    ChunkStream, CompletionRequest, ProviderRegistry, SharedAdapter, StreamContext,
    build_tool_specs,
};
use parley_mcp::SharedToolProxy;
use parley_types::{ChatStreamChunk, GenerationRequest, Message, Role, ToolCall, new_id};

use crate::dispatch::ToolDispatcher;
use crate::error::Result;
use crate::preprocess::InputPreprocessor;
use crate::structured::{validate_output, with_schema_instruction};

/// Default cap on tool rounds per generation request.
pub const DEFAULT_MAX_ROUNDS: u32 = 5;

/// A boxed stream of normalized chunks.
pub type ChatStream = Pin<Box<dyn Stream<Item = ChatStreamChunk> + Send + 'static>>;

/// Orchestrator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Tool rounds allowed before further tool requests are refused.
    pub max_rounds: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Drives provider rounds and tool execution for generation requests.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    proxy: SharedToolProxy,
    preprocessor: Option<Arc<InputPreprocessor>>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("preprocessor", &self.preprocessor.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(registry: ProviderRegistry, proxy: SharedToolProxy) -> Self {
        Self {
            registry: Arc::new(registry),
            proxy,
            preprocessor: None,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Preprocessor applied to user turns of requests that enable it.
    pub fn with_preprocessor(mut self, preprocessor: InputPreprocessor) -> Self {
        self.preprocessor = Some(Arc::new(preprocessor));
        self
    }

    pub fn config(&self) -> OrchestratorConfig {
        self.config
    }

    /// Start a generation turn.
    ///
    /// Credential resolution, adapter construction and opening the first
    /// provider stream fail here, before any chunk exists. Every later
    /// failure arrives in-band as an `error` chunk.
    pub async fn stream(&self, request: GenerationRequest) -> Result<ChatStream> {
        let adapter = self.registry.adapter_for(&request)?;

        let mut history = request.messages.clone();
        if request.enable_input_preprocessing {
            match &self.preprocessor {
                Some(preprocessor) => preprocessor.apply(&mut history),
                None => tracing::debug!(
                    chat_id = %request.chat_id,
                    "Input preprocessing requested but no preprocessor is configured"
                ),
            }
        }
        let history = sanitize_history(history);

        let system = match &request.json_schema {
            Some(schema) => Some(with_schema_instruction(
                request.system_prompt.as_deref(),
                schema,
            )),
            None => request.system_prompt.clone(),
        };

        let eligible = request.eligible_servers();
        let tools = build_tool_specs(&eligible);
        tracing::info!(
            chat_id = %request.chat_id,
            provider = %request.provider_type,
            model = %request.model_id,
            servers = eligible.len(),
            tools = tools.len(),
            "Starting generation"
        );

        let mut completion = CompletionRequest::new(request.model_id.clone(), history)
            .with_params(request.params)
            .with_stop(request.stop.clone())
            .with_tools(tools)
            .with_stream(request.stream);
        if let Some(system) = system {
            completion = completion.with_system(system);
        }

        let ctx = StreamContext::new(new_id(), request.chat_id.clone());
        let first = adapter.stream_completion(&completion, &ctx).await?;

        let turn = Turn {
            adapter,
            dispatcher: ToolDispatcher::new(self.proxy.clone(), eligible),
            max_rounds: self.config.max_rounds,
            json_schema: request.json_schema,
            completion,
            ctx,
        };
        Ok(turn.run(first))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn
// ─────────────────────────────────────────────────────────────────────────────

struct Turn {
    adapter: SharedAdapter,
    dispatcher: ToolDispatcher,
    max_rounds: u32,
    json_schema: Option<serde_json::Value>,
    completion: CompletionRequest,
    ctx: StreamContext,
}

impl Turn {
    fn run(self, first: ChunkStream) -> ChatStream {
        Box::pin(async_stream::stream! {
            let mut turn = self;
            let mut provider = first;
            let mut rounds_run: u32 = 0;

            loop {
                let message_id = turn.ctx.message_id.clone();
                let chat_id = turn.ctx.chat_id.clone();
                let mut text = String::new();
                let mut tool_calls: Vec<ToolCall> = Vec::new();

                while let Some(item) = provider.next().await {
                    match item {
                        Ok(ChatStreamChunk::MessageEnd { .. }) => {}
                        Ok(chunk) => {
                            match &chunk {
                                ChatStreamChunk::ContentDelta { content, .. } => text.push_str(content),
                                ChatStreamChunk::ToolCalls { tool_calls: calls, .. } => {
                                    tool_calls = calls.clone();
                                }
                                _ => {}
                            }
                            yield chunk;
                        }
                        Err(e) => {
                            tracing::warn!(chat_id = %chat_id, round = rounds_run, error = %e, "Provider stream failed");
                            yield ChatStreamChunk::error(message_id.as_str(), e.to_string());
                            return;
                        }
                    }
                }
                drop(provider);

                if tool_calls.is_empty() {
                    if let Some(schema) = &turn.json_schema {
                        if let Err(err) = validate_output(&text, schema) {
                            tracing::info!(chat_id = %chat_id, error = %err, "Structured output failed validation");
                            yield err.to_chunk(&message_id);
                        }
                    }
                    tracing::debug!(chat_id = %chat_id, rounds = rounds_run, "Generation complete");
                    yield ChatStreamChunk::message_end(message_id.as_str());
                    return;
                }

                if rounds_run >= turn.max_rounds {
                    tracing::warn!(
                        chat_id = %chat_id,
                        round = rounds_run,
                        max_rounds = turn.max_rounds,
                        "Tool round limit reached"
                    );
                    yield ChatStreamChunk::error(
                        message_id.as_str(),
                        format!("tool round limit of {} reached", turn.max_rounds),
                    );
                    yield ChatStreamChunk::message_end(message_id.as_str());
                    return;
                }
                rounds_run += 1;

                tracing::info!(chat_id = %chat_id, round = rounds_run, calls = tool_calls.len(), "Running tool round");

                let mut results = Vec::with_capacity(tool_calls.len());
                for call in &tool_calls {
                    let tool = call.function.name.as_str();
                    let server = turn.dispatcher.server_label(tool);
                    yield ChatStreamChunk::tool_call_start(message_id.as_str(), call.id.as_str(), tool, server.as_str());

                    tracing::debug!(chat_id = %chat_id, round = rounds_run, tool = %tool, server = %server, "Dispatching tool call");
                    match turn.dispatcher.invoke(call).await {
                        Ok(result) => {
                            tracing::info!(chat_id = %chat_id, round = rounds_run, tool = %tool, server = %server, "Tool call succeeded");
                            yield ChatStreamChunk::tool_call_result(message_id.as_str(), call.id.as_str(), result.as_str());
                            results.push(Message::tool_result(chat_id.as_str(), call.id.as_str(), result));
                        }
                        Err(err) => {
                            tracing::warn!(chat_id = %chat_id, round = rounds_run, tool = %tool, server = %server, error = %err, "Tool call failed");
                            yield ChatStreamChunk::tool_call_error(message_id.as_str(), call.id.as_str(), err.to_string());
                            results.push(Message::tool_result(chat_id.as_str(), call.id.as_str(), err.to_result_content()));
                        }
                    }
                }

                yield ChatStreamChunk::thinking(message_id.as_str(), true);
                yield ChatStreamChunk::message_end(message_id.as_str());

                turn.completion.messages.push(Message::assistant_tool_calls(chat_id.as_str(), text, tool_calls));
                turn.completion.messages.extend(results);
                turn.ctx = StreamContext::new(new_id(), chat_id.as_str());

                tracing::debug!(
                    chat_id = %chat_id,
                    round = rounds_run,
                    message_id = %turn.ctx.message_id,
                    "Requesting continuation"
                );
                provider = match turn.adapter.stream_completion(&turn.completion, &turn.ctx).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        tracing::warn!(chat_id = %chat_id, round = rounds_run, error = %e, "Continuation failed to open");
                        yield ChatStreamChunk::error(turn.ctx.message_id.as_str(), e.to_string());
                        return;
                    }
                };
            }
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// History
// ─────────────────────────────────────────────────────────────────────────────

/// Make a client-supplied history safe to send to a provider.
///
/// Tool calls without a matching tool result are dropped, as are tool
/// results answering no known call and assistant turns left empty.
pub fn sanitize_history(messages: Vec<Message>) -> Vec<Message> {
    let answered: HashSet<String> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.clone())
        .collect();
    let mut issued: HashSet<String> = HashSet::new();

    messages
        .into_iter()
        .filter_map(|mut msg| match msg.role {
            Role::Assistant => {
                if let Some(calls) = msg.tool_calls.take() {
                    let kept: Vec<ToolCall> =
                        calls.into_iter().filter(|c| answered.contains(&c.id)).collect();
                    issued.extend(kept.iter().map(|c| c.id.clone()));
                    if !kept.is_empty() {
                        msg.tool_calls = Some(kept);
                    }
                }
                if msg.has_tool_calls() || !msg.text().is_empty() {
                    Some(msg)
                } else {
                    None
                }
            }
            Role::Tool => match &msg.tool_call_id {
                Some(id) if issued.contains(id) => Some(msg),
                _ => {
                    tracing::debug!(tool_call_id = ?msg.tool_call_id, "Dropping orphaned tool result");
                    None
                }
            },
            _ => Some(msg),
        })
        .collect()
}
