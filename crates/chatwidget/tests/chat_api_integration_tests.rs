//! Integration tests for the chat microservice client
//!
//! Exercises the streamed send, history retrieval, error mapping and the
//! retry-once-on-401 path against a wiremock server.

use std::sync::Arc;

use chatwidget::api::{
    ChatApiClient, MessagingApi, RetrieveLastMessagesParams, SendMessageRequest, TokenAuthProvider,
};
use chatwidget::message::MessageKind;
use chatwidget::streaming::{StreamHandle, StreamSignal};
use chatwidget::widget::ChatWidget;
use chatwidget::{ChatError, WidgetConfig};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

const SSE_REPLY: &str = "event: typing-indicator\ndata: {\"active\":true}\n\n\
event: ai-answer\ndata: \"Hello\"\n\n\
: keep-alive\n\n\
event: ai-answer\ndata: \", world\"\n\n\
event: token-usage\ndata: {\"total\":7}\n\n";

fn config_for(server: &MockServer) -> WidgetConfig {
    WidgetConfig {
        chat_microservice_host: server.uri(),
        ..WidgetConfig::default()
    }
    .with_widget_api_key("wk_test")
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

async fn collect(mut handle: StreamHandle) -> Vec<StreamSignal> {
    let mut signals = Vec::new();
    while let Some(signal) = handle.next().await {
        signals.push(signal);
    }
    signals
}

fn event_names(signals: &[StreamSignal]) -> Vec<String> {
    signals
        .iter()
        .map(|s| match s {
            StreamSignal::Open => "open".to_string(),
            StreamSignal::Event(frame) => frame.event.clone(),
            StreamSignal::Error(_) => "error".to_string(),
            StreamSignal::Complete => "complete".to_string(),
        })
        .collect()
}

// ============================================================================
// Streamed send
// ============================================================================

#[tokio::test]
async fn test_stream_request_shape_and_signals() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat-widgets/messages"))
        .and(header("accept", "text/event-stream"))
        .and(header("x-widget-key", "wk_test"))
        .and(body_json(json!({"message": "hi"})))
        .respond_with(sse(SSE_REPLY))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatApiClient::new(&config_for(&server)).unwrap();
    let handle = client.open_stream(SendMessageRequest::new("hi")).await.unwrap();
    let signals = collect(handle).await;

    assert_eq!(
        event_names(&signals),
        vec![
            "open",
            "typing-indicator",
            "ai-answer",
            "ai-answer",
            "token-usage",
            "complete"
        ]
    );
}

#[tokio::test]
async fn test_stream_error_status_maps_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat-widgets/messages"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"code": "RATE_LIMITED", "message": "Too many messages"})),
        )
        .mount(&server)
        .await;

    let client = ChatApiClient::new(&config_for(&server)).unwrap();
    let err = match client.open_stream(SendMessageRequest::new("hi")).await {
        Err(err) => err,
        Ok(_) => panic!("expected an error"),
    };

    assert_eq!(err.status(), Some(429));
    assert_eq!(err.code(), "RATE_LIMITED");
    assert_eq!(err.to_string(), "Too many messages");
}

#[tokio::test]
async fn test_stream_error_without_body_uses_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat-widgets/messages"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = ChatApiClient::new(&config_for(&server)).unwrap();
    let err = match client.open_stream(SendMessageRequest::new("hi")).await {
        Err(err) => err,
        Ok(_) => panic!("expected an error"),
    };

    assert_eq!(err.code(), "STREAM_ERROR");
    assert_eq!(err.to_string(), "Failed to send message (status 500)");
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let config = WidgetConfig {
        chat_microservice_host: "http://127.0.0.1:9".to_string(),
        ..WidgetConfig::default()
    };
    let client = ChatApiClient::new(&config).unwrap();
    let result = client.open_stream(SendMessageRequest::new("hi")).await;
    assert!(matches!(result, Err(ChatError::Network { .. })));
}

// ============================================================================
// 401 retry with token refresh
// ============================================================================

#[tokio::test]
async fn test_unauthorized_send_refreshes_and_retries_once() {
    let server = MockServer::start().await;
    let config = config_for(&server);

    Mock::given(method("POST"))
        .and(path("/api/v1/chat-widgets/tokens/refresh"))
        .and(body_json(json!({"customerId": "cust-1", "sessionId": "sess-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 200})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat-widgets/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "expired"})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat-widgets/messages"))
        .respond_with(sse("event: ai-answer\ndata: \"ok\"\n\n"))
        .expect(1)
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let auth = Arc::new(TokenAuthProvider::new(http.clone(), &config));
    auth.set_session("cust-1", "sess-1");
    let client = ChatApiClient::with_http_client(http, &config).with_auth_provider(auth);

    let handle = client.open_stream(SendMessageRequest::new("hi")).await.unwrap();
    let signals = collect(handle).await;
    assert!(matches!(signals.last(), Some(StreamSignal::Complete)));
}

#[tokio::test]
async fn test_failed_refresh_surfaces_original_401() {
    let server = MockServer::start().await;
    let config = config_for(&server);

    Mock::given(method("POST"))
        .and(path("/api/v1/chat-widgets/tokens/refresh"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat-widgets/messages"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let http = reqwest::Client::new();
    let auth = Arc::new(TokenAuthProvider::new(http.clone(), &config));
    auth.set_session("cust-1", "sess-1");
    let client = ChatApiClient::with_http_client(http, &config).with_auth_provider(auth);

    let err = match client.open_stream(SendMessageRequest::new("hi")).await {
        Err(err) => err,
        Ok(_) => panic!("expected an error"),
    };
    assert!(err.is_unauthorized());
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn test_history_query_and_decode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chat-widgets/messages/latest"))
        .and(query_param("limit", "20"))
        .and(query_param("latestChatMessageId", "m-40"))
        .and(header("x-widget-key", "wk_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "message": "ok",
            "data": [
                {"_id": "m-1", "text": "hi", "senderBy": "Customer", "createdAt": "2026-02-01T09:00:00.000Z"},
                {"_id": "m-2", "text": "hello", "senderBy": "Assistant", "msgType": "text", "createdAt": "2026-02-01T09:00:05.000Z"}
            ]
        })))
        .mount(&server)
        .await;

    let client = ChatApiClient::new(&config_for(&server)).unwrap();
    let response = client
        .retrieve_last_messages(RetrieveLastMessagesParams {
            limit: 20,
            latest_chat_message_id: Some("m-40".into()),
        })
        .await
        .unwrap();

    assert_eq!(response.message.as_deref(), Some("ok"));
    assert_eq!(response.data.len(), 2);
    assert_eq!(response.data[1].id, "m-2");
}

#[tokio::test]
async fn test_history_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chat-widgets/messages/latest"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"code": "NOT_FOUND", "message": "No conversation"})),
        )
        .mount(&server)
        .await;

    let client = ChatApiClient::new(&config_for(&server)).unwrap();
    let err = client
        .retrieve_last_messages(RetrieveLastMessagesParams::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert_eq!(err.to_string(), "No conversation");
}

// ============================================================================
// Widget end to end over HTTP
// ============================================================================

#[tokio::test]
async fn test_widget_turn_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat-widgets/messages"))
        .respond_with(sse(SSE_REPLY))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chat-widgets/messages/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"_id": "h-2", "text": "second", "senderBy": "Assistant", "createdAt": "2026-02-01T09:01:00.000Z"},
                {"_id": "h-1", "text": "first", "senderBy": "customer", "createdAt": "2026-02-01T09:00:00.000Z"}
            ]
        })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let client = Arc::new(ChatApiClient::new(&config).unwrap());
    let widget = ChatWidget::new(client, &config);

    let history = widget.load_initial_chat_history().await;
    assert!(history.success);
    assert!(history.has_more);
    assert_eq!(widget.snapshot().latest_chat_message_id.as_deref(), Some("h-1"));

    widget.send_message("hi").await;

    let messages = widget.messages();
    let ids: Vec<_> = messages.iter().take(2).map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["h-1", "h-2"]);
    assert!(messages[0].from_me);
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[3].text, "Hello, world");
    assert_eq!(messages[3].kind, MessageKind::Text);
    assert!(!widget.is_loading());
}

#[tokio::test]
async fn test_widget_turn_http_error_frame() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat-widgets/messages"))
        .respond_with(sse(
            "event: ai-answer\ndata: \"Hel\"\n\nevent: http-error\ndata: {\"message\":\"Upstream model failed\",\"code\":\"LLM_ERROR\"}\n\n",
        ))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let widget = ChatWidget::new(Arc::new(ChatApiClient::new(&config).unwrap()), &config);
    widget.send_message("hi").await;

    let messages = widget.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].kind, MessageKind::System);
    assert_eq!(messages[1].text, "Upstream model failed");
    assert!(!widget.is_loading());
}
