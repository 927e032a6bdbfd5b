//! Turn reducer
//!
//! Maps the signals of one streamed reply onto transcript mutations:
//!
//! ```text
//! idle -> userEcho -> streaming(no assistant) -> streaming(assistant open) -> settled
//! ```
//!
//! The assistant message is created lazily by whichever of `ai-answer`,
//! typing-active or a chain-result final answer arrives first. Its presence
//! is re-checked against the store on every event rather than trusted from
//! an earlier read.

use tracing::debug;

use super::state::ChatStore;
use crate::error::ChatError;
use crate::message::{Message, MessageKind, SENDER_ASSISTANT};
use crate::streaming::TurnEvent;

/// Backfilled into an assistant message that finished without content.
pub const FALLBACK_ACKNOWLEDGEMENT: &str = "Thanks! Your message has been received.";

pub struct TurnReducer {
    store: ChatStore,
    assistant_id: Option<String>,
    bot_disabled: bool,
    settled: bool,
}

impl TurnReducer {
    pub fn new(store: ChatStore) -> Self {
        Self {
            store,
            assistant_id: None,
            bot_disabled: false,
            settled: false,
        }
    }

    pub fn assistant_id(&self) -> Option<&str> {
        self.assistant_id.as_deref()
    }

    pub fn is_bot_disabled(&self) -> bool {
        self.bot_disabled
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Id of the open assistant message, appending a typing placeholder when
    /// there is none.
    fn ensure_assistant_message(&mut self) -> String {
        let current = self.assistant_id.clone();
        let id = self.store.update(|state| {
            if let Some(id) = current.filter(|id| state.contains(id)) {
                return id;
            }
            let placeholder = Message::typing_indicator(SENDER_ASSISTANT);
            let id = placeholder.id.clone();
            state.append_message(placeholder);
            id
        });
        self.assistant_id = Some(id.clone());
        id
    }

    /// Apply one stream event. Nothing is applied once the turn settled or
    /// the bot was disabled for it.
    pub fn apply_event(&mut self, event: TurnEvent) {
        if self.settled || self.bot_disabled {
            return;
        }

        match event {
            TurnEvent::Answer(fragment) => {
                let id = self.ensure_assistant_message();
                self.store.patch_message(&id, |message| {
                    message.text.push_str(&fragment);
                    if !message.text.is_empty() {
                        message.kind = MessageKind::Text;
                    }
                });
            }
            TurnEvent::FinalAnswer(answer) => {
                let id = self.ensure_assistant_message();
                self.store.patch_message(&id, |message| {
                    message.text = answer;
                    message.kind = MessageKind::Text;
                });
            }
            TurnEvent::Typing { active: true } => {
                self.ensure_assistant_message();
            }
            TurnEvent::Typing { active: false } => {
                let Some(id) = self.assistant_id.clone() else {
                    return;
                };
                let removed = self.store.update(|state| {
                    let still_typing = state
                        .find(&id)
                        .is_some_and(|m| m.kind == MessageKind::TypingIndicator);
                    still_typing && state.remove_message(&id)
                });
                if removed {
                    self.assistant_id = None;
                }
            }
            TurnEvent::BotDisabled => {
                debug!("Bot disabled for this conversation");
                if let Some(id) = self.assistant_id.take() {
                    self.store.remove_message(&id);
                }
                self.bot_disabled = true;
            }
            TurnEvent::HttpError => {
                // the controller follows up with an Error signal
            }
            TurnEvent::Other => {}
        }
    }

    /// Clean end of stream.
    pub fn complete(&mut self) {
        if std::mem::replace(&mut self.settled, true) {
            return;
        }
        if self.bot_disabled {
            return;
        }
        if let Some(id) = &self.assistant_id {
            self.store.patch_message(id, |message| {
                if message.text.trim().is_empty() {
                    message.text = FALLBACK_ACKNOWLEDGEMENT.to_string();
                    message.kind = MessageKind::Text;
                }
            });
        }
    }

    /// Failed turn: the assistant slot becomes a single system line.
    pub fn fail(&mut self, err: &ChatError) {
        if std::mem::replace(&mut self.settled, true) {
            return;
        }
        let text = err.user_message();
        let id = self.ensure_assistant_message();
        self.store.patch_message(&id, |message| {
            message.text = text;
            message.kind = MessageKind::System;
        });
    }

    /// User-initiated cancellation. An assistant slot that never received
    /// content is dropped.
    pub fn abort(&mut self) {
        if std::mem::replace(&mut self.settled, true) {
            return;
        }
        if let Some(id) = self.assistant_id.take() {
            self.store.update(|state| {
                let empty = state.find(&id).is_some_and(|m| m.text.trim().is_empty());
                if empty {
                    state.remove_message(&id);
                }
            });
        }
    }
}
