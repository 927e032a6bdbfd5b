//! Socket message reconciliation
//!
//! Messages pushed over the socket may duplicate what the stream already
//! delivered, or confirm an optimistic user echo. Resolution order:
//!
//! 1. non-local senders other than `Employee` are skipped (already streamed)
//! 2. a known id is patched in place
//! 3. a local message patches the latest unconfirmed `fromMe` echo with
//!    identical text
//! 4. otherwise the message is appended

use serde_json::Value;
use tracing::{debug, warn};

use super::state::{ChatState, ChatStore};
use crate::message::{IncomingMessagePayload, Message, SENDER_EMPLOYEE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingOutcome {
    /// Undecodable or empty payload
    Dropped,
    /// Echo of an assistant reply
    Skipped,
    /// Existing message with the same id was updated
    Patched(String),
    /// Optimistic echo took the server id
    Reconciled { placeholder_id: String, id: String },
    Appended(String),
}

pub fn receive_socket_message(store: &ChatStore, payload: Value) -> IncomingOutcome {
    if !payload.is_object() {
        debug!("Ignoring non-object socket message");
        return IncomingOutcome::Dropped;
    }

    let decoded = match IncomingMessagePayload::decode(payload) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!("Dropping malformed socket message: {}", e);
            return IncomingOutcome::Dropped;
        }
    };
    let Some(message) = decoded.normalize() else {
        return IncomingOutcome::Dropped;
    };

    if !message.from_me && !message.sender_label.eq_ignore_ascii_case(SENDER_EMPLOYEE) {
        return IncomingOutcome::Skipped;
    }

    store.update(|state| reconcile(state, message))
}

fn reconcile(state: &mut ChatState, message: Message) -> IncomingOutcome {
    let id = message.id.clone();

    if state.contains(&id) {
        state.patch_message(&id, |existing| *existing = message);
        return IncomingOutcome::Patched(id);
    }

    if message.from_me {
        let placeholder = state
            .messages
            .iter()
            .rev()
            .find(|m| m.from_me && m.pending && m.text == message.text)
            .map(|m| m.id.clone());

        if let Some(placeholder_id) = placeholder {
            state.patch_message(&placeholder_id, |existing| *existing = message);
            return IncomingOutcome::Reconciled { placeholder_id, id };
        }
    }

    state.append_message(message);
    IncomingOutcome::Appended(id)
}
