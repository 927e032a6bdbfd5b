//! Widget Module
//!
//! The transcript reducer and its entry points:
//! - [`ChatWidget`]: send / open / close / history / socket intake
//! - [`ChatStore`]: observable state with atomic snapshots
//! - [`TurnReducer`]: stream signals of one turn to transcript mutations
//! - Typing-indicator timer and socket message reconciliation

pub mod handlers;
pub mod history;
pub mod incoming;
pub mod state;
pub mod turn;
pub mod typing;

pub use handlers::WidgetSocketHandlers;
pub use history::{sort_chronologically, HistoryLoadMode, HistoryLoadResult};
pub use incoming::IncomingOutcome;
pub use state::{ChatState, ChatStore};
pub use turn::{TurnReducer, FALLBACK_ACKNOWLEDGEMENT};
pub use typing::{TypingIndicatorTimer, AGENT_TYPING_SOURCE};

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::api::{MessagingApi, SendMessageRequest};
use crate::config::WidgetConfig;
use crate::error::ChatResult;
use crate::message::Message;
use crate::socket::TypingEventPayload;
use crate::streaming::{StreamController, StreamSignal, TurnEvent};

struct WidgetInner {
    store: ChatStore,
    api: Arc<dyn MessagingApi>,
    /// Cancellation handle of the in-flight turn
    active_stream: Mutex<Option<StreamController>>,
    typing_timer: TypingIndicatorTimer,
    history_page_limit: usize,
}

/// Chat widget core. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ChatWidget {
    inner: Arc<WidgetInner>,
}

/// Non-owning handle to a [`ChatWidget`], held by socket handlers so the
/// socket side never keeps the widget alive.
#[derive(Clone)]
pub struct WeakChatWidget {
    inner: Weak<WidgetInner>,
}

impl WeakChatWidget {
    pub fn upgrade(&self) -> Option<ChatWidget> {
        self.inner.upgrade().map(|inner| ChatWidget { inner })
    }
}

impl ChatWidget {
    pub fn new(api: Arc<dyn MessagingApi>, config: &WidgetConfig) -> Self {
        Self::with_store(api, ChatStore::new(), config)
    }

    pub fn with_store(api: Arc<dyn MessagingApi>, store: ChatStore, config: &WidgetConfig) -> Self {
        Self {
            inner: Arc::new(WidgetInner {
                store,
                api,
                active_stream: Mutex::new(None),
                typing_timer: TypingIndicatorTimer::new(Duration::from_millis(
                    config.typing_indicator_timeout_ms,
                )),
                history_page_limit: config.history_page_limit,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakChatWidget {
        WeakChatWidget {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn store(&self) -> &ChatStore {
        &self.inner.store
    }

    pub fn snapshot(&self) -> ChatState {
        self.inner.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.inner.store.subscribe()
    }

    pub fn messages(&self) -> Arc<Vec<Message>> {
        self.inner.store.messages()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.store.is_loading()
    }

    pub fn open(&self) {
        self.inner.store.update(ChatState::open);
    }

    /// Close the widget, cancelling any in-flight turn.
    pub fn close(&self) {
        self.inner.store.update(ChatState::close);
        if let Some(controller) = self.inner.active_stream.lock().as_ref() {
            controller.cancel();
        }
    }

    pub fn toggle(&self) {
        if self.inner.store.is_open() {
            self.close();
        } else {
            self.open();
        }
    }

    /// Send `text` and stream the reply into the transcript.
    ///
    /// A blank text or a send while another is in flight is a no-op. Turn
    /// failures are written into the transcript and logged, never returned.
    pub async fn send_message(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        // The controller is published under the same lock as the loading
        // check, so a concurrent close() always finds it.
        let controller = {
            let mut active = self.inner.active_stream.lock();
            let started = self.inner.store.update(|state| {
                if state.is_loading {
                    return false;
                }
                state.is_loading = true;
                state.append_message(Message::outgoing(text));
                true
            });
            if !started {
                debug!("Send ignored, a message is already in flight");
                return;
            }
            let controller = StreamController::new();
            *active = Some(controller.clone());
            controller
        };

        if let Err(e) = self.run_turn(text, &controller).await {
            error!("Failed to send message: {}", e);
        }

        *self.inner.active_stream.lock() = None;
        self.inner.store.update(|state| state.is_loading = false);
    }

    async fn run_turn(&self, text: &str, controller: &StreamController) -> ChatResult<()> {
        let mut turn = TurnReducer::new(self.inner.store.clone());

        let opened = tokio::select! {
            biased;
            _ = controller.token().cancelled() => None,
            opened = self.inner.api.open_stream(SendMessageRequest::new(text)) => Some(opened),
        };
        let mut handle = match opened {
            None => {
                turn.abort();
                return Ok(());
            }
            Some(Ok(handle)) => handle,
            Some(Err(err)) => {
                turn.fail(&err);
                return Err(err);
            }
        };

        loop {
            let signal = tokio::select! {
                biased;
                _ = controller.token().cancelled() => {
                    debug!("Turn cancelled");
                    handle.cancel();
                    turn.abort();
                    return Ok(());
                }
                signal = handle.next() => signal,
            };

            match signal {
                Some(StreamSignal::Open) => debug!("Message stream opened"),
                Some(StreamSignal::Event(frame)) => {
                    debug!("Stream event '{}'", frame.event);
                    turn.apply_event(TurnEvent::from_frame(&frame));
                }
                Some(StreamSignal::Error(err)) => {
                    turn.fail(&err);
                    return Err(err);
                }
                Some(StreamSignal::Complete) => {
                    turn.complete();
                    return Ok(());
                }
                None => {
                    turn.abort();
                    return Ok(());
                }
            }
        }
    }

    pub async fn load_initial_chat_history(&self) -> HistoryLoadResult {
        history::retrieve_and_store_messages(
            self.inner.api.as_ref(),
            &self.inner.store,
            HistoryLoadMode::Replace,
            self.inner.history_page_limit,
        )
        .await
    }

    pub async fn load_older_chat_history(&self) -> HistoryLoadResult {
        history::retrieve_and_store_messages(
            self.inner.api.as_ref(),
            &self.inner.store,
            HistoryLoadMode::Prepend,
            self.inner.history_page_limit,
        )
        .await
    }

    /// Intake of `chat:messages:received`.
    pub fn receive_socket_message(&self, payload: Value) -> IncomingOutcome {
        incoming::receive_socket_message(&self.inner.store, payload)
    }

    /// Intake of the socket `typing` event.
    pub fn handle_typing_event(&self, payload: &TypingEventPayload) {
        typing::handle_peer_typing(&self.inner.store, &self.inner.typing_timer, payload);
    }

    pub fn typing_timer(&self) -> &TypingIndicatorTimer {
        &self.inner.typing_timer
    }
}
