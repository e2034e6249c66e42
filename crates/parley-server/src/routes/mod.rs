//! API routes.

pub mod chat;
pub mod health;
pub mod mcp;

pub use chat::chat_stream_handler;
pub use health::{HealthResponse, health_routes};
pub use mcp::mcp_call_handler;
