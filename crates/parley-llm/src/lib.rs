//! Provider adapters for Parley.
//!
//! This crate normalizes the streaming APIs of OpenAI-compatible endpoints,
//! Anthropic and Gemini into one sequence of
//! [`ChatStreamChunk`](parley_types::ChatStreamChunk)s.
//!
//! # Architecture
//!
//! The core abstraction is the [`ProviderAdapter`] trait. A
//! [`ProviderRegistry`] resolves the endpoint and credential of a
//! [`GenerationRequest`](parley_types::GenerationRequest) and builds the
//! adapter registered for its provider type.
//!
//! ```text
//! GenerationRequest ──► ProviderRegistry ──► SharedAdapter
//!                           │                    │
//!                   credentials + base URL       ▼
//!                                     stream_completion() ──► ChunkStream
//! ```

pub mod accumulator;
pub mod adapter;
pub mod credentials;
pub mod error;
pub mod registry;
pub mod sse;
pub mod tools;

// Provider implementations
pub mod anthropic;
pub mod gemini;
pub mod openai;

#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use accumulator::ToolCallAccumulator;
pub use adapter::{
    AdapterConfig, ChunkStream, CompletionRequest, ProviderAdapter, SharedAdapter, StreamContext,
    with_retry,
};
pub use credentials::{ResolvedEndpoint, ResolvedSecret, SecretSource, resolve_api_key};
pub use error::{LlmError, RateLimitInfo, Result};
pub use registry::{AdapterFactory, ProviderRegistry, TransportSettings};
pub use tools::{
    ToolSpec, build_tool_specs, is_valid_tool_name, sanitize_server_id, sanitize_tool_name,
    split_tool_name, synthesize_tool_name,
};

// Re-export provider adapters
pub use anthropic::AnthropicAdapter;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;

#[cfg(any(test, feature = "testing"))]
pub use scripted::{ScriptedAdapter, ScriptedTurn};
