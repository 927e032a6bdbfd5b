//! Socket handlers that feed the widget transcript.

use serde_json::Value;
use tracing::debug;

use super::incoming::IncomingOutcome;
use super::{ChatWidget, WeakChatWidget};
use crate::socket::{SocketEventHandlers, TypingEventPayload};

/// Routes `typing` and `chat:messages:received` into a [`ChatWidget`];
/// lifecycle events keep the logging defaults.
///
/// Only a weak handle is kept: the socket manager owns the handlers while
/// the widget (through its API client) owns the manager.
#[derive(Clone)]
pub struct WidgetSocketHandlers {
    widget: WeakChatWidget,
}

impl WidgetSocketHandlers {
    pub fn new(widget: &ChatWidget) -> Self {
        Self {
            widget: widget.downgrade(),
        }
    }

    fn widget(&self) -> Option<ChatWidget> {
        let widget = self.widget.upgrade();
        if widget.is_none() {
            debug!("[socket] widget dropped, event ignored");
        }
        widget
    }
}

impl SocketEventHandlers for WidgetSocketHandlers {
    fn on_typing(&self, payload: TypingEventPayload) {
        if let Some(widget) = self.widget() {
            widget.handle_typing_event(&payload);
        }
    }

    fn on_message_received(&self, payload: Value) {
        let Some(widget) = self.widget() else {
            return;
        };
        match widget.receive_socket_message(payload) {
            IncomingOutcome::Appended(id) => debug!("[socket] appended message {}", id),
            IncomingOutcome::Reconciled { placeholder_id, id } => {
                debug!("[socket] reconciled {} -> {}", placeholder_id, id)
            }
            other => debug!("[socket] message intake: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        MessagingApi, RetrieveLastMessagesParams, RetrieveLastMessagesResponse, SendMessageRequest,
    };
    use crate::config::WidgetConfig;
    use crate::error::{ChatError, ChatResult};
    use crate::socket::{dispatch_socket_event, SocketEvent};
    use crate::streaming::StreamHandle;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct NoopApi;

    #[async_trait]
    impl MessagingApi for NoopApi {
        async fn open_stream(&self, _payload: SendMessageRequest) -> ChatResult<StreamHandle> {
            Err(ChatError::unknown("unused"))
        }

        async fn retrieve_last_messages(
            &self,
            _params: RetrieveLastMessagesParams,
        ) -> ChatResult<RetrieveLastMessagesResponse> {
            Ok(RetrieveLastMessagesResponse::default())
        }
    }

    #[tokio::test]
    async fn test_socket_events_reach_transcript() {
        let widget = ChatWidget::new(Arc::new(NoopApi), &WidgetConfig::default());
        let handlers = WidgetSocketHandlers::new(&widget);

        dispatch_socket_event(
            &handlers,
            SocketEvent::Typing(json!({"isTyping": true, "source": "agent"})),
        );
        assert!(widget.messages()[0].is_peer_typing_indicator());
        assert!(widget.typing_timer().is_pending());

        dispatch_socket_event(
            &handlers,
            SocketEvent::Typing(json!({"isTyping": false, "source": "agent"})),
        );
        assert!(widget.messages().is_empty());

        dispatch_socket_event(
            &handlers,
            SocketEvent::MessageReceived(json!({"_id": "e1", "text": "hello", "senderBy": "Employee"})),
        );
        assert_eq!(widget.messages()[0].id, "e1");
    }

    #[tokio::test]
    async fn test_handlers_do_not_keep_widget_alive() {
        let widget = ChatWidget::new(Arc::new(NoopApi), &WidgetConfig::default());
        let handlers = WidgetSocketHandlers::new(&widget);
        let weak = widget.downgrade();
        drop(widget);

        assert!(weak.upgrade().is_none());
        dispatch_socket_event(
            &handlers,
            SocketEvent::MessageReceived(json!({"_id": "e1", "text": "hello", "senderBy": "Employee"})),
        );
    }
}
