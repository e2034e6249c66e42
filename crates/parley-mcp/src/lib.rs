//! Tool invocation for Parley.
//!
//! Tools live on external HTTP tool servers. This crate provides the
//! [`McpGateway`], which detects how a server expects to be called and
//! places per-server config parameters, and the [`ToolProxy`] seam the
//! orchestrator calls through.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  ToolProxy                                           │
//! │  - McpGateway: calls tool servers in-process         │
//! │  - HttpToolProxy: forwards to a remote /api/mcp/call │
//! └──────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌──────────────────────────────────────────────────────┐
//! │  Tool server                                         │
//! │  - mcp_standard: POST /call_tool                     │
//! │  - tool_invoke:  POST /tools/{tool}/invoke           │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use parley_mcp::{McpGateway, ToolCallRequest, ToolProxy};
//!
//! let gateway = McpGateway::new()?;
//! let request = ToolCallRequest::new("http://localhost:8001", "add", json!({"a": 1, "b": 2}));
//! let result = gateway.call(&request).await?;
//! ```

pub mod error;
pub mod gateway;
pub mod protocol;
pub mod proxy;

pub use error::{McpError, Result};
pub use gateway::{McpGateway, PlacedParameters, ServerProfile, place_parameters};
pub use protocol::{
    CallingConvention, ConfigSchema, ParameterDefinition, ParameterLocation, ServerInfo,
    ToolCallRequest, ToolCallResponse,
};
pub use proxy::{HttpToolProxy, SharedToolProxy, ToolProxy};
