//! Chat microservice HTTP client
//!
//! Two calls matter to the widget: the streamed send (`POST /messages`,
//! answered with `text/event-stream`) and the history page
//! (`GET /messages/latest`). Both go through [`with_auth_retry`] so an expired
//! token is refreshed once before the error reaches the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::auth::{with_auth_retry, AuthProvider};
use super::types::{
    RetrieveLastMessagesParams, RetrieveLastMessagesResponse, SendMessageRequest, MESSAGES_PATH,
    WIDGET_KEY_HEADER,
};
use crate::config::WidgetConfig;
use crate::error::{ChatError, ChatResult, STREAM_ERROR_CODE, UNKNOWN_ERROR_CODE};
use crate::streaming::{StreamController, StreamHandle};

/// Messaging seam consumed by the widget. Tests substitute scripted streams.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// Send one message and start reading its streamed reply.
    async fn open_stream(&self, payload: SendMessageRequest) -> ChatResult<StreamHandle>;

    /// Fetch one page of history.
    async fn retrieve_last_messages(
        &self,
        params: RetrieveLastMessagesParams,
    ) -> ChatResult<RetrieveLastMessagesResponse>;
}

#[derive(Clone)]
pub struct ChatApiClient {
    http: reqwest::Client,
    host: String,
    widget_key: Option<String>,
    request_timeout: Duration,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl ChatApiClient {
    pub fn new(config: &WidgetConfig) -> ChatResult<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ChatError::network_with_source("Failed to build HTTP client", e))?;
        Ok(Self::with_http_client(http, config))
    }

    /// Build on top of an existing client (shares its cookie jar).
    pub fn with_http_client(http: reqwest::Client, config: &WidgetConfig) -> Self {
        Self {
            http,
            host: config.host().to_string(),
            widget_key: config.widget_key().map(str::to_string),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            auth: None,
        }
    }

    pub fn with_auth_provider(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    fn apply_widget_key(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.widget_key {
            Some(key) => builder.header(WIDGET_KEY_HEADER, key),
            None => builder,
        }
    }

    /// `POST /messages`; returns the response once a 2xx status arrived.
    pub async fn send_message(&self, payload: &SendMessageRequest) -> ChatResult<Response> {
        with_auth_retry(self.auth.as_deref(), || self.post_message(payload)).await
    }

    async fn post_message(&self, payload: &SendMessageRequest) -> ChatResult<Response> {
        let url = self.url(MESSAGES_PATH);
        debug!("POST {}", url);

        let request = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(payload);

        let response = self.apply_widget_key(request).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(
                response,
                STREAM_ERROR_CODE,
                "Failed to send message",
            )
            .await);
        }
        Ok(response)
    }

    async fn get_latest(&self, params: &RetrieveLastMessagesParams) -> ChatResult<RetrieveLastMessagesResponse> {
        let url = self.url(&format!("{}/latest", MESSAGES_PATH));
        debug!("GET {} limit={}", url, params.limit);

        let request = self
            .http
            .get(&url)
            .query(&params.to_query())
            .timeout(self.request_timeout);

        let response = self.apply_widget_key(request).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(
                response,
                UNKNOWN_ERROR_CODE,
                "Failed to retrieve messages",
            )
            .await);
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl MessagingApi for ChatApiClient {
    async fn open_stream(&self, payload: SendMessageRequest) -> ChatResult<StreamHandle> {
        let response = self.send_message(&payload).await?;
        Ok(StreamHandle::spawn(
            Box::pin(response.bytes_stream()),
            StreamController::new(),
        ))
    }

    async fn retrieve_last_messages(
        &self,
        params: RetrieveLastMessagesParams,
    ) -> ChatResult<RetrieveLastMessagesResponse> {
        with_auth_retry(self.auth.as_deref(), || self.get_latest(&params)).await
    }
}

/// Build a structured error from a non-2xx response. The body is tried as
/// JSON first, then kept as raw text.
async fn error_from_response(response: Response, default_code: &str, action: &str) -> ChatError {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to read error body: {}", e);
            String::new()
        }
    };
    error_from_body(status, &text, default_code, action)
}

pub(crate) fn error_from_body(
    status: StatusCode,
    body: &str,
    default_code: &str,
    action: &str,
) -> ChatError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    let code = field("code").unwrap_or_else(|| default_code.to_string());
    let message = field("message")
        .unwrap_or_else(|| format!("{} (status {})", action, status.as_u16()));

    let details = match parsed {
        Some(value) => Some(value),
        None if !body.trim().is_empty() => Some(Value::String(body.to_string())),
        None => None,
    };

    ChatError::stream(Some(status.as_u16()), code, message, details)
}
