//! Decoding `data: <json>` frames from a chunked byte stream.
//!
//! Event framing is left to `eventsource-stream`, which buffers partial
//! lines and split multi-byte characters across reads and drops comment
//! lines. This module only turns each event's data into a chunk.

use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};

use parley_types::ChatStreamChunk;

use crate::error::{ClientError, Result};

/// Decode one event's data. Empty data produces nothing; a payload that
/// is not a valid chunk yields [`ClientError::Parse`].
pub fn decode_event_data(data: &str) -> Option<Result<ChatStreamChunk>> {
    if data.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(data).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse stream frame");
        ClientError::Parse(format!("{} in frame: {}", e, truncate(data, 120)))
    }))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Turn a response body into a stream of decoded chunks.
///
/// Malformed frames yield [`ClientError::Parse`] and decoding goes on. A
/// transport error yields [`ClientError::Http`].
pub fn decode_frames<B, S>(bytes: S) -> impl Stream<Item = Result<ChatStreamChunk>>
where
    B: AsRef<[u8]>,
    S: Stream<Item = reqwest::Result<B>>,
{
    bytes.eventsource().filter_map(|event| async move {
        match event {
            Ok(event) => decode_event_data(&event.data),
            Err(EventStreamError::Transport(e)) => Some(Err(ClientError::Http(e))),
            Err(e) => Some(Err(ClientError::Parse(e.to_string()))),
        }
    })
}
