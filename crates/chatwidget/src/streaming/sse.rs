//! Server-Sent Events (SSE) Frame Decoder
//!
//! Turns the raw bytes of a streamed HTTP body into discrete [`SseFrame`]s:
//! - frames are delimited by a blank line (`\n\n`)
//! - `event:` sets the event name (defaults to `message`)
//! - `data:` lines are collected and joined with `\n`
//! - comment/heartbeat frames (leading `:`) are skipped
//! - the joined data is parsed as JSON, falling back to the raw string
//!
//! Carriage returns are dropped as text enters the buffer, so CRLF streams
//! split on the same boundaries as LF streams.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name used when a frame carries no `event:` line.
pub const DEFAULT_EVENT_NAME: &str = "message";

const FRAME_DELIMITER: &str = "\n\n";
const COMMENT_PREFIX: char = ':';

/// One complete SSE record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SseFrame {
    pub event: String,
    /// JSON payload, the raw string when the data is not JSON, or `Null`
    /// when the frame had no `data:` line
    pub data: Value,
    /// Trimmed frame text
    pub raw: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        let event = event.into();
        let raw = format!("event: {}\ndata: {}", event, data);
        Self { event, data, raw }
    }

    pub fn is(&self, event: &str) -> bool {
        self.event == event
    }
}

/// Parse a single frame. Returns `None` for blank and comment frames.
pub fn parse_frame(chunk: &str) -> Option<SseFrame> {
    let trimmed = chunk.trim();
    if trimmed.is_empty() || trimmed.starts_with(COMMENT_PREFIX) {
        return None;
    }

    let text = trimmed.replace('\r', "");
    let mut event = DEFAULT_EVENT_NAME.to_string();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if let Some(value) = line.strip_prefix("event:") {
            let value = value.trim();
            event = if value.is_empty() {
                DEFAULT_EVENT_NAME.to_string()
            } else {
                value.to_string()
            };
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        }
    }

    let data = if data_lines.is_empty() {
        Value::Null
    } else {
        let joined = data_lines.join("\n");
        if joined.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&joined).unwrap_or(Value::String(joined))
        }
    };

    Some(SseFrame {
        event,
        data,
        raw: text,
    })
}

/// Incremental decoder over a byte stream.
///
/// Bytes are decoded as UTF-8 incrementally: a multi-byte sequence split
/// across two chunks is held back until the rest of it arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    pending_bytes: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every frame completed by them.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.pending_bytes.extend_from_slice(bytes);
        self.decode_pending(false);
        self.drain_frames(false)
    }

    /// Feed already-decoded text.
    pub fn push_str(&mut self, text: &str) -> Vec<SseFrame> {
        self.append_text(text);
        self.drain_frames(false)
    }

    /// End of stream: flush incomplete bytes and the trailing partial frame.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        self.decode_pending(true);
        self.drain_frames(true)
    }

    /// Text still waiting for a frame delimiter.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    fn append_text(&mut self, text: &str) {
        self.buffer.extend(text.chars().filter(|c| *c != '\r'));
    }

    fn decode_pending(&mut self, final_chunk: bool) {
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    let text = text.to_string();
                    self.append_text(&text);
                    self.pending_bytes.clear();
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    let prefix = String::from_utf8_lossy(&self.pending_bytes[..valid]).into_owned();
                    self.append_text(&prefix);

                    match err.error_len() {
                        // incomplete sequence at the end
                        None if !final_chunk => {
                            self.pending_bytes.drain(..valid);
                            return;
                        }
                        None => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.clear();
                            return;
                        }
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending_bytes.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    fn drain_frames(&mut self, final_flush: bool) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.find(FRAME_DELIMITER) {
            let rest = self.buffer.split_off(pos + FRAME_DELIMITER.len());
            let segment = std::mem::replace(&mut self.buffer, rest);
            if let Some(frame) = parse_frame(&segment) {
                frames.push(frame);
            }
        }

        if final_flush {
            let segment = std::mem::take(&mut self.buffer);
            if let Some(frame) = parse_frame(&segment) {
                frames.push(frame);
            }
        }

        frames
    }
}
