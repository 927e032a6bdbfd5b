//! Streaming Module
//!
//! Provides the streamed-reply side of the widget:
//! - SSE frame decoding over a fetch body
//! - Typed decode of turn events
//! - Cancellable read loop producing ordered stream signals
//!

pub mod controller;
pub mod events;
pub mod sse;

// Re-exports
pub use controller::{StreamController, StreamHandle, StreamSignal};
pub use events::{
    http_error_from_payload, TurnEvent, STREAMING_EVENT_AI_ANSWER, STREAMING_EVENT_BOT_DISABLED,
    STREAMING_EVENT_CHAIN_RESULT, STREAMING_EVENT_HTTP_ERROR, STREAMING_EVENT_IS_UNDERSTAND,
    STREAMING_EVENT_LLM_CONVO_MEMORY, STREAMING_EVENT_TOKEN_USAGE,
    STREAMING_EVENT_TYPING_INDICATOR,
};
pub use sse::{parse_frame, FrameDecoder, SseFrame, DEFAULT_EVENT_NAME};
