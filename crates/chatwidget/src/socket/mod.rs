//! Socket Module
//!
//! Real-time channel of the widget (presence, typing, message echo):
//! - Endpoint resolution and connection options with auth injection
//! - Socket.IO over a websocket transport with reconnection
//! - Explicitly owned lifecycle manager (`init` / `get` / `teardown`)
//! - Handler registration and outbound emitters

pub mod connection;
pub mod emitters;
pub mod handlers;
pub mod manager;
pub mod packet;
pub mod types;

pub use connection::SocketConnection;
pub use emitters::emit_typing_event;
pub use handlers::{
    dispatch_socket_event, register_socket_event_handlers, HandlerRegistration, LoggingHandlers,
    SocketEventHandlers,
};
pub use manager::{build_connection_options, resolve_socket_endpoint, SocketManager};
pub use types::{
    ConnectionOptions, ConnectionState, SocketClientConfig, SocketEndpoint, SocketEvent,
    TypingEventPayload, EVENT_MESSAGES_RECEIVED, EVENT_TYPING, SOCKET_PATH_SUFFIX,
    WIDGET_KEY_AUTH_FIELD,
};
