//! Chat widget client core
//!
//! Connects a conversational UI to the chat microservice over two channels:
//! a streamed HTTP reply (SSE over a fetch body) and a Socket.IO connection
//! (typing, message echo). Both feed one deduplicated transcript held by
//! [`ChatWidget`].

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod network;
pub mod socket;
pub mod streaming;
pub mod widget;

pub use api::{ChatApiClient, MessagingApi, TokenAuthProvider};
pub use bootstrap::WidgetServices;
pub use config::WidgetConfig;
pub use error::{ChatError, ChatResult};
pub use logging::init_logging;
pub use message::{Message, MessageKind};
pub use socket::{SocketConnection, SocketManager};
pub use streaming::{FrameDecoder, SseFrame, StreamController, StreamHandle, StreamSignal};
pub use widget::{ChatState, ChatStore, ChatWidget, HistoryLoadResult};
