//! Stream event names and typed decode of turn events.

use serde::Deserialize;
use serde_json::Value;

use super::sse::SseFrame;
use crate::error::{ChatError, STREAM_ERROR_CODE};

pub const STREAMING_EVENT_AI_ANSWER: &str = "ai-answer";
pub const STREAMING_EVENT_TOKEN_USAGE: &str = "token-usage";
pub const STREAMING_EVENT_HTTP_ERROR: &str = "http-error";
pub const STREAMING_EVENT_CHAIN_RESULT: &str = "chain-result";
pub const STREAMING_EVENT_IS_UNDERSTAND: &str = "is-understand";
pub const STREAMING_EVENT_LLM_CONVO_MEMORY: &str = "llm-convo-memory";
pub const STREAMING_EVENT_BOT_DISABLED: &str = "bot-disabled";
pub const STREAMING_EVENT_TYPING_INDICATOR: &str = "typing-indicator";

const STREAMING_REQUEST_FAILED: &str = "Streaming request failed";

/// Turn-relevant view of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Token fragment to append
    Answer(String),
    /// Authoritative final answer, replaces the assistant text
    FinalAnswer(String),
    /// Assistant typing indicator toggled
    Typing { active: bool },
    /// Bot disabled for this conversation
    BotDisabled,
    /// Fatal error reported inside the stream
    HttpError,
    /// Anything the reducer does not act on
    Other,
}

#[derive(Debug, Deserialize)]
struct ChainResultPayload {
    #[serde(rename = "finalAnswer", alias = "final_answer", default)]
    final_answer: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TypingIndicatorPayload {
    Flag { active: bool },
    Bare(bool),
}

impl TurnEvent {
    pub fn from_frame(frame: &SseFrame) -> Self {
        match frame.event.as_str() {
            STREAMING_EVENT_AI_ANSWER => match &frame.data {
                Value::String(s) => Self::Answer(s.clone()),
                Value::Number(n) => Self::Answer(n.to_string()),
                _ => Self::Other,
            },
            STREAMING_EVENT_CHAIN_RESULT => {
                match serde_json::from_value::<ChainResultPayload>(frame.data.clone()) {
                    Ok(ChainResultPayload {
                        final_answer: Some(Value::String(answer)),
                    }) => Self::FinalAnswer(answer),
                    _ => Self::Other,
                }
            }
            STREAMING_EVENT_TYPING_INDICATOR => {
                match serde_json::from_value::<TypingIndicatorPayload>(frame.data.clone()) {
                    Ok(TypingIndicatorPayload::Flag { active })
                    | Ok(TypingIndicatorPayload::Bare(active)) => Self::Typing { active },
                    Err(_) => Self::Other,
                }
            }
            STREAMING_EVENT_BOT_DISABLED => Self::BotDisabled,
            STREAMING_EVENT_HTTP_ERROR => Self::HttpError,
            _ => Self::Other,
        }
    }
}

/// Build the error carried by an `http-error` frame.
pub fn http_error_from_payload(data: &Value) -> ChatError {
    let message = match data {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| STREAMING_REQUEST_FAILED.to_string()),
        _ => STREAMING_REQUEST_FAILED.to_string(),
    };

    let (status, code, details) = match data {
        Value::Object(map) => (
            map.get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok()),
            map.get("code")
                .and_then(Value::as_str)
                .unwrap_or(STREAM_ERROR_CODE)
                .to_string(),
            Some(data.clone()),
        ),
        _ => (None, STREAM_ERROR_CODE.to_string(), None),
    };

    ChatError::stream(status, code, message, details)
}
