//! # SSE frame decoder
//!
//! Decodes a chunked byte stream into wire frames. Each frame carries an
//! optional `id`, an optional `event` type, and a `data` payload; a blank
//! line terminates a frame. The decoder handles:
//!
//! - Line buffering across chunk boundaries
//! - `data:` / `event:` / `id:` field extraction (multi-line data joined
//!   with newlines)
//! - Comment lines (leading `:`) and unknown fields, which are skipped
//! - CRLF line endings
//! - Remaining buffer processing when the stream ends mid-frame

use bytes::BytesMut;
use futures::Stream;
use tokio_stream::StreamExt;

use courier_core::SseError;

/// One decoded wire frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame id, if the server sent one.
    pub id: Option<String>,
    /// Event type string, if the server sent one.
    pub event: Option<String>,
    /// Data payload; multi-line data is joined with `\n`.
    pub data: String,
}

/// Accumulates fields until a blank line dispatches the frame.
#[derive(Default)]
struct FrameBuilder {
    id: Option<String>,
    event: Option<String>,
    data_lines: Vec<String>,
    has_fields: bool,
}

impl FrameBuilder {
    /// Apply one non-blank line to the pending frame.
    fn apply_line(&mut self, line: &str) {
        // Comment line
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            // A line without a colon is a field with an empty value
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data_lines.push(value.to_string());
                self.has_fields = true;
            }
            "event" => {
                self.event = Some(value.to_string());
                self.has_fields = true;
            }
            "id" => {
                self.id = Some(value.to_string());
                self.has_fields = true;
            }
            // Unknown fields (e.g. "retry") are tolerated and skipped
            _ => {}
        }
    }

    /// Dispatch the pending frame, if any field was seen.
    fn take(&mut self) -> Option<RawFrame> {
        if !self.has_fields {
            return None;
        }
        let frame = RawFrame {
            id: self.id.take(),
            event: self.event.take(),
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        self.has_fields = false;
        Some(frame)
    }
}

/// Decode wire frames from a byte stream.
///
/// Transport errors are passed through as the final item; a trailing
/// unterminated frame is flushed when the stream ends. Invalid UTF-8 lines
/// are skipped.
pub fn decode_frames<S>(byte_stream: S) -> impl Stream<Item = Result<RawFrame, SseError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, SseError>> + Send + 'static,
{
    async_stream::stream! {
        let mut buffer = BytesMut::with_capacity(8192);
        let mut builder = FrameBuilder::default();
        let mut stream = std::pin::pin!(byte_stream);

        loop {
            // Drain complete lines from the buffer
            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let mut line_bytes = buffer.split_to(newline_pos + 1);
                line_bytes.truncate(line_bytes.len() - 1);
                if line_bytes.last() == Some(&b'\r') {
                    line_bytes.truncate(line_bytes.len() - 1);
                }

                let Ok(line) = std::str::from_utf8(&line_bytes) else {
                    continue;
                };

                if line.is_empty() {
                    if let Some(frame) = builder.take() {
                        yield Ok(frame);
                    }
                } else {
                    builder.apply_line(line);
                }
            }

            match stream.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    yield Err(err);
                    return;
                }
                None => {
                    // Stream ended — flush any unterminated trailing frame
                    if !buffer.is_empty() {
                        if let Ok(line) = std::str::from_utf8(&buffer) {
                            let line = line.trim_end_matches('\r');
                            if !line.is_empty() {
                                builder.apply_line(line);
                            }
                        }
                    }
                    if let Some(frame) = builder.take() {
                        yield Ok(frame);
                    }
                    return;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
