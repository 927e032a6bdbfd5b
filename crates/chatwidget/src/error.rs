//! Chat widget error types
//!
//! Every fallible operation in this crate returns [`ChatError`]. Variants
//! follow the failure taxonomy of the widget:
//!
//! - `Network`: transport-level failures (HTTP connect, socket I/O)
//! - `Stream`: non-2xx streaming responses and mid-stream `http-error` frames
//! - `Auth`: unauthorized responses that could not be recovered by a refresh
//! - `Protocol`: payloads that could not be decoded at the network boundary
//! - `Unknown`: anything else
//!
//! Each variant maps to a stable string code (see [`ChatError::code`]) so that
//! callers can branch on it without matching on the message text.

use thiserror::Error;

/// Result alias used across the crate.
pub type ChatResult<T> = Result<T, ChatError>;

/// Code used when the streaming endpoint fails without a server-provided code.
pub const STREAM_ERROR_CODE: &str = "STREAM_ERROR";
/// Code used for transport failures.
pub const NETWORK_ERROR_CODE: &str = "NETWORK_ERROR";
/// Code used for unclassified failures.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

/// Generic text shown when a failed turn carries no message of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum ChatError {
    /// Transport-level failure (fetch, websocket, DNS, TLS...)
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The chat service answered with an error, either as a non-2xx status or
    /// as an `http-error` frame inside the stream.
    #[error("{message}")]
    Stream {
        /// HTTP status, `None` for mid-stream failures
        status: Option<u16>,
        code: String,
        message: String,
        /// Decoded error body when the server sent a JSON object
        details: Option<serde_json::Value>,
    },

    /// Unauthorized, and the token refresh did not help
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// A payload could not be decoded
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// The socket manager has not been initialized yet
    #[error("Socket client has not been initialized. Call init() first.")]
    NotInitialized,

    /// The socket transport is not running
    #[error("Socket is not connected")]
    NotConnected,

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{message}")]
    Unknown { message: String },
}

impl ChatError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn stream(
        status: Option<u16>,
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self::Stream {
            status,
            code: code.into(),
            message: message.into(),
            details,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// HTTP status associated with the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Stream { status, .. } => *status,
            Self::Auth { .. } => Some(401),
            Self::Network { source, .. } => source
                .as_ref()
                .and_then(|s| s.downcast_ref::<reqwest::Error>())
                .and_then(|e| e.status())
                .map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the error is an unauthorized response.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Stable string code.
    pub fn code(&self) -> &str {
        match self {
            Self::Network { .. } => NETWORK_ERROR_CODE,
            Self::Stream { code, .. } => code,
            Self::Auth { .. } => "AUTH_ERROR",
            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Unknown { .. } => UNKNOWN_ERROR_CODE,
        }
    }

    /// Text shown inline in the transcript when a turn fails.
    pub fn user_message(&self) -> String {
        let message = match self {
            Self::Network { message, .. }
            | Self::Stream { message, .. }
            | Self::Auth { message }
            | Self::Protocol { message }
            | Self::Config { message }
            | Self::Unknown { message } => message.trim().to_string(),
            other => other.to_string(),
        };

        if message.is_empty() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            message
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "Request timed out".to_string()
        } else if err.is_connect() {
            "Failed to connect to the chat service".to_string()
        } else {
            err.to_string()
        };
        Self::network_with_source(message, err)
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::protocol(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::network_with_source("WebSocket transport failure", err)
    }
}
