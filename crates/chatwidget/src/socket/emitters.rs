//! Outbound socket events

use tracing::debug;

use super::manager::SocketManager;
use super::types::{TypingEventPayload, EVENT_TYPING};
use crate::error::ChatResult;

/// Emit a typing event, connecting the socket first if needed.
pub fn emit_typing_event(manager: &SocketManager, payload: &TypingEventPayload) -> ChatResult<()> {
    let connection = manager.get()?;
    if !connection.is_connected() {
        debug!("Socket not connected, connecting before emitting typing");
        connection.connect()?;
    }
    connection.emit(EVENT_TYPING, &serde_json::to_value(payload)?)
}
