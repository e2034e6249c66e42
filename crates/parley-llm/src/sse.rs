//! Server-sent event framing for provider byte streams.
//!
//! Lines are split on raw bytes and only decoded once complete, so a
//! multi-byte character that straddles two network reads survives intact.

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::{LlmError, Result};

/// One `data:` line from an event stream, with the `event:` name in effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Line Buffer
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Take whatever is left once the stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame Parser
// ─────────────────────────────────────────────────────────────────────────────

/// Turns event-stream lines into [`SseFrame`]s.
///
/// Every `data:` line is its own frame; providers put one JSON document per
/// line. Comments and unknown fields are skipped, and a blank line resets the
/// current event name.
#[derive(Debug, Default)]
pub struct FrameParser {
    lines: LineBuffer,
    event: Option<String>,
}

impl FrameParser {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        let lines = self.lines.push(bytes);
        lines.iter().filter_map(|l| self.on_line(l)).collect()
    }

    pub fn finish(&mut self) -> Vec<SseFrame> {
        match self.lines.finish() {
            Some(line) => self.on_line(&line).into_iter().collect(),
            None => Vec::new(),
        }
    }

    fn on_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            self.event = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => {
                self.event = Some(value.to_string());
                None
            }
            "data" => Some(SseFrame {
                event: self.event.clone(),
                data: value.to_string(),
            }),
            _ => None,
        }
    }
}

/// Adapt a byte stream into a stream of frames.
///
/// A transport failure is yielded once as a network error and ends the
/// stream.
pub fn sse_frames<S, E>(byte_stream: S) -> impl Stream<Item = Result<SseFrame>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut parser = FrameParser::default();
        let mut byte_stream = Box::pin(byte_stream);

        while let Some(item) = byte_stream.next().await {
            match item {
                Ok(bytes) => {
                    for frame in parser.push(&bytes) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(LlmError::Network(format!("Stream interrupted: {}", e)));
                    return;
                }
            }
        }

        for frame in parser.finish() {
            yield Ok(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multibyte_split_across_reads() {
        let text = "data: {\"t\":\"héllo 世界\"}\n";
        let bytes = text.as_bytes();
        // Split inside the three-byte encoding of '世'.
        let cut = text.find('世').unwrap() + 1;

        let mut parser = FrameParser::default();
        assert!(parser.push(&bytes[..cut]).is_empty());
        let frames = parser.push(&bytes[cut..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"t\":\"héllo 世界\"}");
    }

    #[test]
    fn test_event_names_and_comments() {
        let mut parser = FrameParser::default();
        let frames = parser.push(
            b": keep-alive\nevent: message_start\ndata: {\"a\":1}\n\ndata: {\"b\":2}\r\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event.as_deref(), Some("message_start"));
        assert_eq!(frames[1].event, None);
        assert_eq!(frames[1].data, "{\"b\":2}");
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let mut parser = FrameParser::default();
        assert!(parser.push(b"data: [DONE]").is_empty());
        let frames = parser.finish();
        assert_eq!(frames[0].data, "[DONE]");
    }

    #[tokio::test]
    async fn test_sse_frames_stream() {
        let chunks: Vec<std::result::Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"data: one\n\nda")),
            Ok(Bytes::from_static(b"ta: two\n")),
            Err("reset".to_string()),
            Ok(Bytes::from_static(b"data: never\n")),
        ];
        let frames: Vec<_> = sse_frames(futures::stream::iter(chunks)).collect().await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].as_ref().unwrap().data, "one");
        assert_eq!(frames[1].as_ref().unwrap().data, "two");
        assert!(matches!(frames[2], Err(LlmError::Network(_))));
    }
}
