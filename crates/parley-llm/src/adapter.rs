//! The provider adapter trait and the plumbing shared by every adapter.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  ProviderAdapter trait                       │
//! │  - map_history() -> provider message shape   │
//! │  - map_tools()   -> provider tool shape      │
//! │  - stream_completion() -> ChunkStream        │
//! └──────────────────────────────────────────────┘
//!                      │
//!      ┌───────────────┼───────────────┐
//!      ▼               ▼               ▼
//! ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │  OpenAI  │   │ Anthropic │   │  Gemini  │
//! └──────────┘   └───────────┘   └──────────┘
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, header};

use parley_types::{ChatStreamChunk, Message, ProviderType, SamplingParams, ToolCall};

use crate::error::{LlmError, Result};
use crate::sse::SseFrame;
use crate::tools::ToolSpec;

/// Default number of retries when opening a provider stream.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default initial backoff between retries.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures and rate limits). A
/// provider-specified `Retry-After` takes precedence over the computed
/// backoff.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                let delay = e.retry_after().unwrap_or(backoff);
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt = attempt,
                    max_retries = max_retries,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

/// A provider-agnostic completion request for one round.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub system: Option<String>,
    pub params: SamplingParams,
    pub stop: Vec<String>,
    /// Tools offered to the model; empty means no tools are attached.
    pub tools: Vec<ToolSpec>,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            params: SamplingParams::default(),
            stop: Vec::new(),
            tools: Vec::new(),
            stream: true,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Identity stamped on every chunk of one adapter round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamContext {
    pub message_id: String,
    pub chat_id: String,
}

impl StreamContext {
    pub fn new(message_id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            chat_id: chat_id.into(),
        }
    }
}

/// A finite, non-restartable sequence of normalized chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatStreamChunk>> + Send + 'static>>;

// ─────────────────────────────────────────────────────────────────────────────
// Adapter Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Resolved endpoint and transport settings for one adapter instance.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub provider_type: ProviderType,
    pub base_url: String,
    /// `None` only for custom endpoints that accept anonymous requests.
    pub api_key: Option<String>,
    /// Whole-request timeout; `None` leaves long generations uncapped.
    pub timeout: Option<Duration>,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Name used in logs.
    pub name: String,
}

impl AdapterConfig {
    pub fn new(provider_type: ProviderType, base_url: impl Into<String>) -> Self {
        Self {
            provider_type,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            name: provider_type.name().to_string(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Build the HTTP client for this configuration.
    pub(crate) fn http_client(&self) -> Result<Client> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))
    }

    /// Send a request, retrying transient failures, and reject error statuses.
    pub(crate) async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        with_retry(self.max_retries, self.retry_backoff, &self.name, || {
            let request = build();
            async move {
                let response = request.send().await?;
                check_status(response).await
            }
        })
        .await
    }
}

/// Turn a non-success response into the matching error.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::from_status(status, &body, retry_after.as_deref()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider Adapter Trait
// ─────────────────────────────────────────────────────────────────────────────

/// One implementation per provider family.
///
/// Adapters differ in how they shape history and tools, but every round they
/// stream yields `message_start`, zero or more `content_delta`, `tool_calls`
/// only when the turn ended on tool calls, then `message_end`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Name of this adapter instance, for logs.
    fn name(&self) -> &str;

    /// Map the conversation (history and system prompt) into the provider's
    /// request fields, returned as a JSON object.
    fn map_history(&self, request: &CompletionRequest) -> Result<serde_json::Value>;

    /// Map tool specs into the provider's tool field. `None` when there are
    /// no tools to attach.
    fn map_tools(&self, tools: &[ToolSpec]) -> Option<serde_json::Value>;

    /// Open the provider stream and normalize it.
    ///
    /// Errors returned here happen before any chunk; errors inside the
    /// stream happen after the provider accepted the request.
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        ctx: &StreamContext,
    ) -> Result<ChunkStream>;
}

/// Shared adapter handle.
pub type SharedAdapter = Arc<dyn ProviderAdapter>;

// ─────────────────────────────────────────────────────────────────────────────
// Round Driver
// ─────────────────────────────────────────────────────────────────────────────

/// What one provider frame meant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    Text(String),
    Done,
}

/// Per-provider frame interpretation for one round.
pub(crate) trait RoundParser: Send + 'static {
    /// Interpret one frame. Provider error frames come back as `Err`.
    fn on_frame(&mut self, frame: &SseFrame) -> Result<Step>;

    /// Calls to report once the frames are exhausted; empty unless the turn
    /// ended because of tool calls.
    fn finish(&mut self) -> Vec<ToolCall>;
}

/// Wrap a frame stream into the normalized chunk sequence of one round.
pub(crate) fn drive_round<S, P>(ctx: StreamContext, frames: S, mut parser: P) -> ChunkStream
where
    S: Stream<Item = Result<SseFrame>> + Send + 'static,
    P: RoundParser,
{
    Box::pin(async_stream::stream! {
        let id = ctx.message_id;
        yield Ok(ChatStreamChunk::message_start(id.clone(), ctx.chat_id));

        let mut frames = Box::pin(frames);
        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            match parser.on_frame(&frame) {
                Ok(Step::Continue) => {}
                Ok(Step::Text(text)) => yield Ok(ChatStreamChunk::content_delta(id.clone(), text)),
                Ok(Step::Done) => break,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        let calls = parser.finish();
        if !calls.is_empty() {
            yield Ok(ChatStreamChunk::tool_calls(id.clone(), calls));
        }
        yield Ok(ChatStreamChunk::message_end(id));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_with_retry_recovers_from_network_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(3, Duration::from_millis(1), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(LlmError::Network("reset".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(2, Duration::from_millis(1), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Network("down".into()))
        })
        .await;
        assert!(matches!(result, Err(LlmError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_skips_permanent_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(5, Duration::from_millis(1), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Auth("nope".into()))
        })
        .await;
        assert!(matches!(result, Err(LlmError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct Echo;

    impl RoundParser for Echo {
        fn on_frame(&mut self, frame: &SseFrame) -> Result<Step> {
            match frame.data.as_str() {
                "[DONE]" => Ok(Step::Done),
                "boom" => Err(LlmError::Backend("boom".into())),
                "" => Ok(Step::Continue),
                text => Ok(Step::Text(text.to_string())),
            }
        }

        fn finish(&mut self) -> Vec<ToolCall> {
            Vec::new()
        }
    }

    fn frames(data: &[&str]) -> impl Stream<Item = Result<SseFrame>> + Send + 'static {
        let items: Vec<Result<SseFrame>> = data
            .iter()
            .map(|d| {
                Ok(SseFrame {
                    event: None,
                    data: d.to_string(),
                })
            })
            .collect();
        futures::stream::iter(items)
    }

    #[tokio::test]
    async fn test_drive_round_shape() {
        let ctx = StreamContext::new("m1", "c1");
        let chunks: Vec<_> = drive_round(ctx, frames(&["a", "", "b", "[DONE]", "late"]), Echo)
            .collect()
            .await;
        let kinds: Vec<_> = chunks.iter().map(|c| c.as_ref().unwrap().kind()).collect();
        assert_eq!(
            kinds,
            vec!["message_start", "content_delta", "content_delta", "message_end"]
        );
    }

    #[tokio::test]
    async fn test_drive_round_stops_on_error() {
        let ctx = StreamContext::new("m1", "c1");
        let chunks: Vec<_> = drive_round(ctx, frames(&["a", "boom", "b"]), Echo)
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
        assert!(matches!(chunks[2], Err(LlmError::Backend(_))));
    }
}
