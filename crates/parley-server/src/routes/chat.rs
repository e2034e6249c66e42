//! Streaming chat endpoint.
//!
//! Each [`ChatStreamChunk`] of a turn is sent as one SSE `data:` frame.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};

use parley_types::{ChatApiRequest, ChatStreamChunk};

use crate::error::ServerError;
use crate::state::AppState;

/// POST /api/chat/stream
///
/// Validation, credential and first-open failures are answered with a JSON
/// error status. Once the stream is open every failure arrives in-band.
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let request: ChatApiRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "Rejected chat request body");
        ServerError::BadRequest("Invalid request body".to_string())
    })?;
    let request = request.into_generation_request()?;

    tracing::info!(
        chat_id = %request.chat_id,
        provider = request.provider_type.name(),
        model = %request.model_id,
        messages = request.messages.len(),
        tool_servers = request.tool_servers.len(),
        "Starting chat stream"
    );

    let chunks = state.orchestrator.stream(request).await?;
    let events = chunks.map(|chunk| Ok(chunk_event(&chunk)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn chunk_event(chunk: &ChatStreamChunk) -> Event {
    Event::default().json_data(chunk).unwrap_or_else(|e| {
        tracing::warn!(kind = chunk.kind(), error = %e, "Failed to encode chunk");
        Event::default().comment("unencodable chunk")
    })
}
