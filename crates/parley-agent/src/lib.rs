//! Generation core for Parley.
//!
//! This crate turns a [`GenerationRequest`](parley_types::GenerationRequest)
//! into one normalized chunk stream, running any tools the model asks for
//! along the way.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Orchestrator                                               │
//! │  - Preprocesses user turns (optional)                       │
//! │  - Drives provider rounds                                   │
//! │  - Runs tool calls sequentially between rounds              │
//! │  - Validates structured output                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!       ┌────────────┐  ┌─────────────┐  ┌────────────┐
//!       │ Provider   │  │ToolDispatch │  │ Validator  │
//!       │(parley-llm)│  │(parley-mcp) │  │(jsonschema)│
//!       └────────────┘  └─────────────┘  └────────────┘
//! ```

pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod preprocess;
pub mod structured;

pub use dispatch::{ToolDispatcher, parse_arguments};
pub use error::{AgentError, Result, ToolInvocationError, ValidationError};
pub use orchestrator::{
    ChatStream, DEFAULT_MAX_ROUNDS, Orchestrator, OrchestratorConfig, sanitize_history,
};
pub use preprocess::{
    DEFAULT_BLOCKED_MARKER, DEFAULT_DISCUSSION_MARKERS, InputPreprocessor, PreprocessorConfig,
    RiskTier,
};
pub use structured::{extract_json, schema_instruction, validate_output, with_schema_instruction};
