//! Shared types for Parley.
//!
//! Everything that crosses a crate boundary or the wire lives here: the
//! conversation [`Message`], tool descriptions, the normalized
//! [`ChatStreamChunk`] protocol, and the inbound generation request.

pub mod chunk;
pub mod message;
pub mod request;
pub mod tool;

pub use chunk::{ChatStreamChunk, ChunkError, MessageStartInfo, encode_frame};
pub use message::{
    ContentPart, Message, MessageContent, Role, ToolCallState, ToolCallStatus, new_id, now,
};
pub use request::{
    ChatApiRequest, GenerationRequest, ProviderType, RequestError, SamplingParams,
    DEFAULT_TEMPERATURE,
};
pub use tool::{FunctionCall, ToolCall, ToolDefinition, ToolServer, ToolServerConfig};

/// Timestamp type used throughout Parley.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
