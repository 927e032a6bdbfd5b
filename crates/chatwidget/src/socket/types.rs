//! Socket types
//!
//! Connection options, endpoint, typed events and the typing payload shared
//! by the socket manager, the transport and the handlers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::network::BackoffConfig;

/// Fixed suffix appended to the base path of the socket endpoint.
pub const SOCKET_PATH_SUFFIX: &str = "/chat-socket";
/// Auth field carrying the widget credential.
pub const WIDGET_KEY_AUTH_FIELD: &str = "x-widget-key";

/// Outbound/inbound typing event.
pub const EVENT_TYPING: &str = "typing";
/// Server push of a message-shaped payload.
pub const EVENT_MESSAGES_RECEIVED: &str = "chat:messages:received";

/// Connection options handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOptions {
    /// Connect as soon as the connection object is created
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(default = "default_true")]
    pub reconnection: bool,
    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,
    #[serde(default = "default_reconnection_delay")]
    pub reconnection_delay_ms: u64,
    #[serde(default = "default_reconnection_delay_max")]
    pub reconnection_delay_max_ms: u64,
    /// Connect + handshake timeout
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_transports")]
    pub transports: Vec<String>,
    #[serde(default = "default_true")]
    pub with_credentials: bool,
    /// Request path; resolved from the endpoint when absent
    #[serde(default)]
    pub path: Option<String>,
    /// Payload of the Socket.IO CONNECT packet
    #[serde(default)]
    pub auth: Option<Map<String, Value>>,
}

fn default_true() -> bool {
    true
}
fn default_reconnection_attempts() -> u32 {
    10
}
fn default_reconnection_delay() -> u64 {
    1000
}
fn default_reconnection_delay_max() -> u64 {
    5000
}
fn default_timeout() -> u64 {
    20000
}
fn default_transports() -> Vec<String> {
    vec!["websocket".to_string()]
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_connect: false,
            reconnection: default_true(),
            reconnection_attempts: default_reconnection_attempts(),
            reconnection_delay_ms: default_reconnection_delay(),
            reconnection_delay_max_ms: default_reconnection_delay_max(),
            timeout_ms: default_timeout(),
            transports: default_transports(),
            with_credentials: default_true(),
            path: None,
            auth: None,
        }
    }
}

impl ConnectionOptions {
    /// Backoff used between reconnection attempts.
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            base_delay: self.reconnection_delay_ms,
            max_delay: self.reconnection_delay_max_ms,
            ..BackoffConfig::default()
        }
    }
}

/// Caller-side configuration of `SocketManager::init`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocketClientConfig {
    /// Overrides the manager's default URL
    pub url: Option<String>,
    /// Connect right after initialization
    pub auto_connect: bool,
    /// Option overrides; caller auth fields are preserved
    pub options: ConnectionOptions,
}

impl SocketClientConfig {
    pub fn auto_connect() -> Self {
        Self {
            auto_connect: true,
            ..Self::default()
        }
    }
}

/// Resolved connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEndpoint {
    /// Origin (`scheme://host[:port]`)
    pub url: String,
    /// Request path, always ending in the socket suffix
    pub path: String,
}

/// Typing event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEventPayload {
    #[serde(default)]
    pub conversation_id: String,
    pub is_typing: bool,
    /// `agent`, `customer`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Lifecycle and domain events observed on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Connect { socket_id: Option<String> },
    Disconnect { reason: String },
    ConnectError { message: String },
    Error { message: String },
    Reconnect { attempt: u32 },
    Typing(Value),
    MessageReceived(Value),
    Custom { event: String, data: Value },
}

impl SocketEvent {
    /// Map a server event name to its typed variant.
    pub fn from_server_event(event: String, data: Value) -> Self {
        match event.as_str() {
            EVENT_TYPING => Self::Typing(data),
            EVENT_MESSAGES_RECEIVED => Self::MessageReceived(data),
            _ => Self::Custom { event, data },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_options_defaults() {
        let options = ConnectionOptions::default();
        assert!(!options.auto_connect);
        assert!(options.reconnection);
        assert_eq!(options.reconnection_attempts, 10);
        assert_eq!(options.timeout_ms, 20000);
        assert_eq!(options.transports, vec!["websocket"]);
        assert!(options.with_credentials);
        assert!(options.auth.is_none());

        let backoff = options.backoff();
        assert_eq!(backoff.base_delay, 1000);
        assert_eq!(backoff.max_delay, 5000);
    }

    #[test]
    fn test_typing_payload_wire_shape() {
        let payload: TypingEventPayload =
            serde_json::from_value(json!({"isTyping": true, "source": "agent"})).unwrap();
        assert!(payload.is_typing);
        assert_eq!(payload.conversation_id, "");
        assert_eq!(payload.source.as_deref(), Some("agent"));

        let value = serde_json::to_value(TypingEventPayload {
            conversation_id: "c-1".into(),
            is_typing: false,
            source: None,
        })
        .unwrap();
        assert_eq!(value, json!({"conversationId": "c-1", "isTyping": false}));
    }

    #[test]
    fn test_server_event_mapping() {
        assert_eq!(
            SocketEvent::from_server_event("typing".into(), json!({"isTyping": true})),
            SocketEvent::Typing(json!({"isTyping": true}))
        );
        assert!(matches!(
            SocketEvent::from_server_event("chat:messages:received".into(), json!({})),
            SocketEvent::MessageReceived(_)
        ));
        assert!(matches!(
            SocketEvent::from_server_event("presence".into(), Value::Null),
            SocketEvent::Custom { .. }
        ));
    }
}
