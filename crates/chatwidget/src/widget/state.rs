//! Observable widget state
//!
//! [`ChatStore`] is the single writer of the transcript. Every mutation runs
//! under a lock and then publishes a fresh [`ChatState`] snapshot through a
//! `watch` channel. The transcript is an `Arc<Vec<Message>>` that is replaced
//! on write, so readers holding a snapshot never observe a half-applied change.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::message::{Message, MessageKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    pub is_open: bool,
    pub is_loading: bool,
    pub messages: Arc<Vec<Message>>,
    pub unread_count: usize,
    /// Pagination cursor for older history
    pub latest_chat_message_id: Option<String>,
}

impl ChatState {
    fn replace_messages(&mut self, f: impl FnOnce(&mut Vec<Message>)) {
        let mut next = self.messages.as_ref().clone();
        f(&mut next);
        self.messages = Arc::new(next);
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn find(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Append; counts as unread when the widget is closed and the message is
    /// not ours.
    pub fn append_message(&mut self, message: Message) {
        if !self.is_open && !message.from_me {
            self.unread_count += 1;
        }
        self.replace_messages(|messages| messages.push(message));
    }

    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = Arc::new(messages);
    }

    /// Prepend, skipping ids already present. Returns how many were added.
    pub fn prepend_messages(&mut self, older: Vec<Message>) -> usize {
        let fresh: Vec<Message> = older
            .into_iter()
            .filter(|m| !self.contains(&m.id))
            .collect();
        let added = fresh.len();
        if added > 0 {
            self.replace_messages(|messages| {
                let mut merged = fresh;
                merged.append(messages);
                *messages = merged;
            });
        }
        added
    }

    /// Patch in place. Returns `false` when the id is unknown.
    pub fn patch_message(&mut self, id: &str, patch: impl FnOnce(&mut Message)) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        self.replace_messages(|messages| patch(&mut messages[index]));
        true
    }

    pub fn remove_message(&mut self, id: &str) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        self.replace_messages(|messages| {
            messages.remove(index);
        });
        true
    }

    pub fn clear_messages(&mut self) {
        self.messages = Arc::new(Vec::new());
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Peer typing indicator, if one is in the transcript.
    pub fn peer_typing_indicator(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_peer_typing_indicator())
    }

    pub fn set_latest_chat_message_id(&mut self, id: Option<String>) {
        self.latest_chat_message_id = id;
    }

    pub fn open(&mut self) {
        self.is_open = true;
        self.unread_count = 0;
    }

    pub fn close(&mut self) {
        self.is_open = false;
    }

    pub fn system_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.kind == MessageKind::System)
    }
}

/// Shared, observable handle over [`ChatState`]. Cheap to clone.
#[derive(Clone)]
pub struct ChatStore {
    state: Arc<Mutex<ChatState>>,
    snapshots: Arc<watch::Sender<ChatState>>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ChatState::default());
        Self {
            state: Arc::new(Mutex::new(ChatState::default())),
            snapshots: Arc::new(tx),
        }
    }

    /// Run one mutation and publish the resulting snapshot.
    pub fn update<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut state = self.state.lock();
        let result = f(&mut state);
        self.snapshots.send_replace(state.clone());
        result
    }

    /// Read without publishing.
    pub fn read<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        f(&self.state.lock())
    }

    pub fn snapshot(&self) -> ChatState {
        self.state.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.snapshots.subscribe()
    }

    pub fn messages(&self) -> Arc<Vec<Message>> {
        self.state.lock().messages.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().is_loading
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().is_open
    }

    pub fn unread_count(&self) -> usize {
        self.state.lock().unread_count
    }

    pub fn append_message(&self, message: Message) {
        self.update(|s| s.append_message(message));
    }

    pub fn set_messages(&self, messages: Vec<Message>) {
        self.update(|s| s.set_messages(messages));
    }

    pub fn prepend_messages(&self, messages: Vec<Message>) -> usize {
        self.update(|s| s.prepend_messages(messages))
    }

    pub fn patch_message(&self, id: &str, patch: impl FnOnce(&mut Message)) -> bool {
        self.update(|s| s.patch_message(id, patch))
    }

    pub fn remove_message(&self, id: &str) -> bool {
        self.update(|s| s.remove_message(id))
    }

    pub fn clear_messages(&self) {
        self.update(ChatState::clear_messages);
    }

    pub fn last_message(&self) -> Option<Message> {
        self.read(|s| s.last_message().cloned())
    }

    pub fn set_latest_chat_message_id(&self, id: Option<String>) {
        self.update(|s| s.set_latest_chat_message_id(id));
    }

    pub fn latest_chat_message_id(&self) -> Option<String> {
        self.read(|s| s.latest_chat_message_id.clone())
    }
}
