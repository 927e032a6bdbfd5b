//! Chat microservice API
//!
//! - Streamed send and history retrieval ([`ChatApiClient`])
//! - The [`MessagingApi`] seam consumed by the widget
//! - Retry-once-on-401 wrapper and token refresh provider

pub mod auth;
pub mod client;
pub mod types;

pub use auth::{with_auth_retry, AuthProvider, CustomerSession, TokenAuthProvider};
pub use client::{ChatApiClient, MessagingApi};
pub use types::{
    RefreshTokenRequest, RetrieveLastMessagesParams, RetrieveLastMessagesResponse,
    SendMessageRequest, MESSAGES_PATH, TOKEN_REFRESH_PATH, WIDGET_KEY_HEADER,
};
