//! SSE streaming response parser for OpenAI-compatible chat completions.
//!
//! Reads a response body as a byte stream, splits it on `\n`, and turns each
//! `data: {json}` line into the text fragment found at
//! `choices[0].delta.content`. `data: [DONE]` ends the stream. Lines that
//! are not data lines, or whose JSON does not parse, are skipped.

use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};

use super::errors::LmStudioError;
use super::types::ChatCompletionChunk;

/// Prefix of a server-sent-event data line.
const DATA_PREFIX: &str = "data: ";

/// Terminal sentinel sent as the last data payload.
const DONE_SENTINEL: &str = "[DONE]";

// ─── Line classification ─────────────────────────────────────────────────────

/// What a single SSE line means to the reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// A content fragment to forward to the caller.
    Content(String),
    /// The `[DONE]` sentinel: stop reading.
    Done,
    /// Blank, comment, non-data, malformed, or content-free line.
    Skip,
}

/// Classify one line of the event stream. Surrounding whitespace is ignored.
pub fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return SseLine::Skip;
    };

    if data == DONE_SENTINEL {
        return SseLine::Done;
    }

    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::trace!(error = %e, "skipping malformed SSE data line");
            return SseLine::Skip;
        }
    };

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .map_or(SseLine::Skip, SseLine::Content)
}

// ─── Line buffer ─────────────────────────────────────────────────────────────

/// Accumulates raw bytes and hands out complete `\n`-terminated lines.
///
/// Bytes are kept undecoded until a full line is available so multi-byte
/// UTF-8 sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete line (without its terminator), if any.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buf.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line[..end]).into_owned())
    }

    /// Take whatever is left once the body has ended.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&rest).into_owned();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

// ─── Stream adapter ──────────────────────────────────────────────────────────

struct StreamState<S> {
    bytes: Pin<Box<S>>,
    lines: LineBuffer,
    finished: bool,
}

/// Turn a raw byte stream into a stream of content fragments.
///
/// The stream ends at `[DONE]` or at end of body, whichever comes first. A
/// transport error is yielded once and ends the stream.
pub fn parse_sse_stream<S, B, E>(
    byte_stream: S,
    buffer_capacity: usize,
) -> impl Stream<Item = Result<String, LmStudioError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = StreamState {
        bytes: Box::pin(byte_stream),
        lines: LineBuffer::with_capacity(buffer_capacity),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            // Drain complete lines before reading more data
            if let Some(line) = state.lines.next_line() {
                match parse_sse_line(&line) {
                    SseLine::Content(text) => return Some((Ok(text), state)),
                    SseLine::Done => {
                        state.finished = true;
                        return None;
                    }
                    SseLine::Skip => continue,
                }
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.lines.extend(chunk.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((
                        Err(LmStudioError::Request {
                            context: "streaming".into(),
                            reason: format!("stream read error: {e}"),
                        }),
                        state,
                    ));
                }
                None => {
                    // Body ended; a last line may lack its newline
                    state.finished = true;
                    if let Some(line) = state.lines.take_remainder() {
                        if let SseLine::Content(text) = parse_sse_line(&line) {
                            return Some((Ok(text), state));
                        }
                    }
                    return None;
                }
            }
        }
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn body(chunks: &[&str]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    async fn collect(chunks: &[&str]) -> Vec<String> {
        parse_sse_stream(body(chunks), 64)
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[test]
    fn test_parse_line_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Content("Hi".into()));
    }

    #[test]
    fn test_parse_line_done() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line("  data: [DONE]\r"), SseLine::Done);
    }

    #[test]
    fn test_parse_line_skips_non_data() {
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message"), SseLine::Skip);
        assert_eq!(parse_sse_line("data:{\"choices\":[]}"), SseLine::Skip);
    }

    #[test]
    fn test_parse_line_skips_malformed_json() {
        assert_eq!(parse_sse_line("data: {not json"), SseLine::Skip);
    }

    #[test]
    fn test_parse_line_skips_role_only_delta() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Skip);
    }

    #[test]
    fn test_line_buffer_splits_lines() {
        let mut buf = LineBuffer::default();
        buf.extend(b"one\ntw");
        assert_eq!(buf.next_line().as_deref(), Some("one"));
        assert!(buf.next_line().is_none());
        buf.extend(b"o\n");
        assert_eq!(buf.next_line().as_deref(), Some("two"));
        assert!(buf.take_remainder().is_none());
    }

    #[test]
    fn test_line_buffer_multibyte_split_across_chunks() {
        let text = "data: é\n".as_bytes();
        let (a, b) = text.split_at(7); // splits inside 'é'
        let mut buf = LineBuffer::default();
        buf.extend(a);
        buf.extend(b);
        assert_eq!(buf.next_line().as_deref(), Some("data: é"));
    }

    #[tokio::test]
    async fn test_stream_yields_fragments_in_order_and_stops_at_done() {
        let fragments = collect(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n",
        ])
        .await;
        assert_eq!(fragments, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_stream_handles_partial_chunks() {
        let fragments = collect(&[
            "data: {\"choices\":[{\"del",
            "ta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}",
            "\n\ndata: [DONE]\n\n",
        ])
        .await;
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_stream_skips_garbage_lines() {
        let fragments = collect(&[
            ": ping\n",
            "data: {broken\n",
            "event: foo\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        ])
        .await;
        assert_eq!(fragments, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_stream_processes_trailing_line_without_newline() {
        let fragments = collect(&["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"]).await;
        assert_eq!(fragments, vec!["tail"]);
    }

    #[tokio::test]
    async fn test_stream_surfaces_read_error_once() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n".to_vec()),
            Err(std::io::Error::other("connection reset")),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"y\"}}]}\n".to_vec()),
        ];
        let results: Vec<_> = parse_sse_stream(stream::iter(chunks), 16).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "x");
        assert!(matches!(results[1], Err(LmStudioError::Request { .. })));
    }
}
