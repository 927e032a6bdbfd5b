//! Chat microservice request/response types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::HistoryMessageRecord;

/// Base path of the messaging endpoints.
pub const MESSAGES_PATH: &str = "/api/v1/chat-widgets/messages";
/// Token refresh endpoint.
pub const TOKEN_REFRESH_PATH: &str = "/api/v1/chat-widgets/tokens/refresh";
/// Header carrying the widget credential.
pub const WIDGET_KEY_HEADER: &str = "x-widget-key";

/// Body of `POST /messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

impl SendMessageRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Query of `GET /messages/latest`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetrieveLastMessagesParams {
    pub limit: usize,
    /// Cursor: fetch messages older than this one
    pub latest_chat_message_id: Option<String>,
}

impl RetrieveLastMessagesParams {
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let limit = if self.limit == 0 { 20 } else { self.limit };
        let mut query = vec![("limit", limit.to_string())];
        if let Some(id) = self.latest_chat_message_id.as_deref().filter(|id| !id.is_empty()) {
            query.push(("latestChatMessageId", id.to_string()));
        }
        query
    }
}

/// Response of `GET /messages/latest`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrieveLastMessagesResponse {
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Vec<HistoryMessageRecord>,
}

/// Body of `POST /tokens/refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub customer_id: String,
    pub session_id: String,
}
