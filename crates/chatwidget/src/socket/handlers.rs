//! Socket event handlers
//!
//! The fixed set of lifecycle and domain callbacks registered on every
//! connection. Default implementations only log, so transport churn never
//! reaches the transcript unless an implementor opts in.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::SocketConnection;
use super::types::{SocketEvent, TypingEventPayload};

pub trait SocketEventHandlers: Send + Sync + 'static {
    fn on_connect(&self, socket_id: Option<&str>) {
        info!("[socket] connected: {:?}", socket_id);
    }

    fn on_disconnect(&self, reason: &str) {
        warn!("[socket] disconnected: {}", reason);
    }

    fn on_connect_error(&self, message: &str) {
        error!("[socket] connect error: {}", message);
    }

    fn on_error(&self, message: &str) {
        error!("[socket] error: {}", message);
    }

    fn on_reconnect(&self, attempt: u32) {
        info!("[socket] reconnected after {} attempt(s)", attempt);
    }

    fn on_typing(&self, payload: TypingEventPayload) {
        debug!("[socket] typing: {:?}", payload);
    }

    fn on_message_received(&self, payload: Value) {
        debug!("[socket] message received: {}", payload);
    }

    fn on_custom(&self, event: &str, _data: Value) {
        debug!("[socket] unhandled event '{}'", event);
    }
}

/// Handlers that only log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandlers;

impl SocketEventHandlers for LoggingHandlers {}

/// Keeps handlers attached until dropped or unregistered.
#[derive(Debug)]
pub struct HandlerRegistration {
    token: CancellationToken,
}

impl HandlerRegistration {
    pub fn unregister(self) {
        // Drop cancels
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

impl Drop for HandlerRegistration {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Route one event to its callback. Malformed typing payloads are logged and
/// dropped.
pub fn dispatch_socket_event(handlers: &dyn SocketEventHandlers, event: SocketEvent) {
    match event {
        SocketEvent::Connect { socket_id } => handlers.on_connect(socket_id.as_deref()),
        SocketEvent::Disconnect { reason } => handlers.on_disconnect(&reason),
        SocketEvent::ConnectError { message } => handlers.on_connect_error(&message),
        SocketEvent::Error { message } => handlers.on_error(&message),
        SocketEvent::Reconnect { attempt } => handlers.on_reconnect(attempt),
        SocketEvent::Typing(data) => match serde_json::from_value::<TypingEventPayload>(data) {
            Ok(payload) => handlers.on_typing(payload),
            Err(e) => warn!("[socket] dropping malformed typing payload: {}", e),
        },
        SocketEvent::MessageReceived(data) => handlers.on_message_received(data),
        SocketEvent::Custom { event, data } => handlers.on_custom(&event, data),
    }
}

/// Subscribe `handlers` to the connection's events.
pub fn register_socket_event_handlers(
    connection: &SocketConnection,
    handlers: Arc<dyn SocketEventHandlers>,
) -> HandlerRegistration {
    let mut events = connection.subscribe();
    let token = CancellationToken::new();
    let stopped = token.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = stopped.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => dispatch_socket_event(handlers.as_ref(), event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[socket] handler lagged, {} event(s) skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("[socket] handlers unregistered");
    });

    HandlerRegistration { token }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl SocketEventHandlers for Recorder {
        fn on_connect(&self, socket_id: Option<&str>) {
            self.calls.lock().push(format!("connect:{}", socket_id.unwrap_or("-")));
        }
        fn on_reconnect(&self, attempt: u32) {
            self.calls.lock().push(format!("reconnect:{}", attempt));
        }
        fn on_typing(&self, payload: TypingEventPayload) {
            self.calls.lock().push(format!("typing:{}", payload.is_typing));
        }
        fn on_message_received(&self, payload: Value) {
            self.calls.lock().push(format!("message:{}", payload["_id"]));
        }
    }

    #[test]
    fn test_dispatch_routes_events() {
        let recorder = Recorder::default();
        dispatch_socket_event(&recorder, SocketEvent::Connect { socket_id: Some("s1".into()) });
        dispatch_socket_event(&recorder, SocketEvent::Reconnect { attempt: 3 });
        dispatch_socket_event(&recorder, SocketEvent::Typing(json!({"isTyping": true})));
        dispatch_socket_event(&recorder, SocketEvent::MessageReceived(json!({"_id": "m1"})));
        dispatch_socket_event(&recorder, SocketEvent::Disconnect { reason: "x".into() });

        assert_eq!(
            *recorder.calls.lock(),
            vec!["connect:s1", "reconnect:3", "typing:true", "message:\"m1\""]
        );
    }

    #[test]
    fn test_malformed_typing_payload_is_dropped() {
        let recorder = Recorder::default();
        dispatch_socket_event(&recorder, SocketEvent::Typing(json!({"isTyping": "yes"})));
        assert!(recorder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_registration_cancelled_on_drop() {
        let registration = HandlerRegistration {
            token: CancellationToken::new(),
        };
        let token = registration.token.clone();
        assert!(registration.is_active());
        registration.unregister();
        assert!(token.is_cancelled());
    }
}
