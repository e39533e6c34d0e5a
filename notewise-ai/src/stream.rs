//! Streaming response decoding.
//!
//! Both backends deliver newline-delimited frames over a chunked HTTP body:
//! - Hosted chat-completions: Server-Sent Events, `data: <json>` per line,
//!   terminated by `data: [DONE]`
//! - Ollama: one JSON object per line, terminated by `"done": true`
//!
//! Network reads do not respect frame boundaries, so bytes are buffered and
//! only complete lines are handed to the parsers.

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Line Reassembly
// ============================================================================

/// Reassembles newline-terminated lines from arbitrary byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    ///
    /// Lines are returned without their terminator (`\n` or `\r\n`).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Flush the unterminated remainder at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// ============================================================================
// Frame Parsers
// ============================================================================

/// A decoded Server-Sent Events line from a chat-completions stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A non-empty text fragment.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
    /// Blank lines, comments, non-data fields, or frames without text.
    Ignored,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Parse one SSE line.
pub fn parse_sse_line(line: &str) -> Result<SseFrame, serde_json::Error> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(SseFrame::Ignored);
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return Ok(SseFrame::Done);
    }
    if data.is_empty() {
        return Ok(SseFrame::Ignored);
    }

    let chunk: ChatChunk = serde_json::from_str(data)?;
    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|text| !text.is_empty());

    Ok(content.map_or(SseFrame::Ignored, SseFrame::Delta))
}

/// A decoded line from an Ollama `/api/generate` stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GenerateFrame {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

/// Parse one NDJSON line. Blank lines yield `None`.
pub fn parse_ndjson_line(line: &str) -> Result<Option<GenerateFrame>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

// ============================================================================
// Stream Driver
// ============================================================================

/// What the line handler wants after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineControl {
    Continue,
    Stop,
}

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The body ended.
    Exhausted,
    /// The handler saw a terminal frame.
    Finished,
    /// The cancellation token fired.
    Cancelled,
}

/// Feed complete lines of `stream` to `on_line` until the body ends, the
/// handler stops, or `cancel` fires.
///
/// Cancellation is checked at every read and before every line, so nothing
/// is delivered once the token is cancelled.
pub async fn drive_lines<S, B, E, F>(
    stream: S,
    cancel: &CancellationToken,
    mut on_line: F,
) -> Result<StreamEnd, E>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    F: FnMut(&str) -> LineControl,
{
    let mut stream = std::pin::pin!(stream);
    let mut buffer = LineBuffer::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                for line in buffer.push(bytes.as_ref()) {
                    if cancel.is_cancelled() {
                        return Ok(StreamEnd::Cancelled);
                    }
                    if on_line(&line) == LineControl::Stop {
                        return Ok(StreamEnd::Finished);
                    }
                }
            }
            Some(Err(e)) => return Err(e),
            None => {
                if let Some(line) = buffer.finish() {
                    if cancel.is_cancelled() {
                        return Ok(StreamEnd::Cancelled);
                    }
                    if on_line(&line) == LineControl::Stop {
                        return Ok(StreamEnd::Finished);
                    }
                }
                return Ok(StreamEnd::Exhausted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::convert::Infallible;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], Infallible>> {
        let items: Vec<Result<&'static [u8], Infallible>> =
            parts.iter().map(|&p| Ok(p.as_bytes())).collect();
        stream::iter(items)
    }

    #[test]
    fn test_line_buffer_reassembles_split_frames() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        assert_eq!(buffer.push(b": 1}\r\ndata: x\n"), vec!["data: {\"a\": 1}", "data: x"]);
        assert_eq!(buffer.finish(), None);

        buffer.push(b"tail");
        assert_eq!(buffer.finish().as_deref(), Some("tail"));
    }

    #[test]
    fn test_line_buffer_keeps_split_utf8_intact() {
        let bytes = "上下文\n".as_bytes();
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(&bytes[..4]).is_empty());
        assert_eq!(buffer.push(&bytes[4..]), vec!["上下文"]);
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap(),
            SseFrame::Delta("Hi".into())
        );
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseFrame::Done);
        assert_eq!(parse_sse_line("").unwrap(), SseFrame::Ignored);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseFrame::Ignored);
        assert_eq!(parse_sse_line("event: message").unwrap(), SseFrame::Ignored);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseFrame::Ignored
        );
        assert_eq!(parse_sse_line(r#"data: {"choices":[]}"#).unwrap(), SseFrame::Ignored);
        assert!(parse_sse_line("data: {broken").is_err());
    }

    #[test]
    fn test_parse_ndjson_line() {
        let frame = parse_ndjson_line(r#"{"response":"Hel","done":false}"#)
            .unwrap()
            .unwrap();
        assert_eq!(frame.response, "Hel");
        assert!(!frame.done);

        let last = parse_ndjson_line(r#"{"done":true,"eval_count":12}"#)
            .unwrap()
            .unwrap();
        assert!(last.done);
        assert!(last.response.is_empty());

        assert_eq!(parse_ndjson_line("   ").unwrap(), None);
        assert!(parse_ndjson_line("not json").is_err());
    }

    #[tokio::test]
    async fn test_drive_lines_flushes_trailing_line() {
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let end = drive_lines(chunks(&["a\nb", "c\nd"]), &cancel, |line| {
            seen.push(line.to_string());
            LineControl::Continue
        })
        .await
        .unwrap();

        assert_eq!(end, StreamEnd::Exhausted);
        assert_eq!(seen, vec!["a", "bc", "d"]);
    }

    #[tokio::test]
    async fn test_drive_lines_stops_on_request() {
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let end = drive_lines(chunks(&["one\nstop\nafter\n"]), &cancel, |line| {
            seen.push(line.to_string());
            if line == "stop" {
                LineControl::Stop
            } else {
                LineControl::Continue
            }
        })
        .await
        .unwrap();

        assert_eq!(end, StreamEnd::Finished);
        assert_eq!(seen, vec!["one", "stop"]);
    }

    #[tokio::test]
    async fn test_drive_lines_cancelled_from_handler() {
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let end = drive_lines(chunks(&["one\ntwo\n", "three\n"]), &cancel, |line| {
            seen.push(line.to_string());
            cancel.cancel();
            LineControl::Continue
        })
        .await
        .unwrap();

        assert_eq!(end, StreamEnd::Cancelled);
        assert_eq!(seen, vec!["one"]);
    }

    #[tokio::test]
    async fn test_drive_lines_precancelled_reads_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = 0;
        let end = drive_lines(chunks(&["one\n"]), &cancel, |_| {
            calls += 1;
            LineControl::Continue
        })
        .await
        .unwrap();

        assert_eq!(end, StreamEnd::Cancelled);
        assert_eq!(calls, 0);
    }
}
