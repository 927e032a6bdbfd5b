//! Socket connection
//!
//! A Socket.IO client over a single websocket transport. The transport runs
//! as one background task per connection:
//!
//! ```text
//! connect -> engine OPEN -> CONNECT(auth) -> ack -> event loop
//!    ^                                                  |
//!    +---------- backoff <-- lost (reconnection) <------+
//! ```
//!
//! Every (re)connect replays the auth payload in the CONNECT packet. Events
//! are fanned out through a broadcast channel; see
//! [`register_socket_event_handlers`](super::register_socket_event_handlers).

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::packet::{
    connect_error_message, decode_packet, encode_connect, encode_event, EnginePacket, OpenPacket,
    SocketPacket, DISCONNECT, PONG,
};
use super::types::{ConnectionOptions, ConnectionState, SocketEndpoint, SocketEvent};
use crate::error::{ChatError, ChatResult};
use crate::network::{calculate_backoff_delay, cancelable_delay};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

const EVENT_CAPACITY: usize = 256;

/// State shared between the connection handle and its transport task.
struct Shared {
    state: RwLock<ConnectionState>,
    socket_id: RwLock<Option<String>>,
    events: broadcast::Sender<SocketEvent>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn set_connected(&self, socket_id: Option<String>) {
        *self.socket_id.write() = socket_id;
        self.set_state(ConnectionState::Connected);
    }

    fn set_disconnected(&self) {
        *self.socket_id.write() = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn emit(&self, event: SocketEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

struct Transport {
    outgoing: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Transport {
    fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.task.is_finished()
    }
}

pub struct SocketConnection {
    endpoint: SocketEndpoint,
    options: ConnectionOptions,
    shared: Arc<Shared>,
    transport: Mutex<Option<Transport>>,
}

impl SocketConnection {
    pub fn new(endpoint: SocketEndpoint, options: ConnectionOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            endpoint,
            options,
            shared: Arc::new(Shared {
                state: RwLock::new(ConnectionState::Disconnected),
                socket_id: RwLock::new(None),
                events,
            }),
            transport: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// `ws(s)://origin/path/?EIO=4&transport=websocket`
    pub fn websocket_url(&self) -> ChatResult<String> {
        let mut url = url::Url::parse(&self.endpoint.url)
            .map_err(|e| ChatError::config(format!("Invalid socket url '{}': {}", self.endpoint.url, e)))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(ChatError::config(format!(
                    "Unsupported socket url scheme '{}'",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ChatError::config("Failed to set websocket scheme"))?;

        let path = self
            .options
            .path
            .as_deref()
            .unwrap_or(&self.endpoint.path)
            .trim_end_matches('/');
        url.set_path(&format!("{}/", path));
        url.set_query(Some("EIO=4&transport=websocket"));
        Ok(url.to_string())
    }

    /// Start the transport. No-op while a transport is already running.
    pub fn connect(&self) -> ChatResult<()> {
        let mut transport = self.transport.lock();
        if transport.as_ref().is_some_and(Transport::is_running) {
            debug!("Socket transport already running");
            return Ok(());
        }

        let ctx = TransportContext {
            url: self.websocket_url()?,
            auth: self.options.auth.clone().map(Value::Object),
            options: self.options.clone(),
            shared: self.shared.clone(),
        };

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        self.shared.set_state(ConnectionState::Connecting);
        info!("Connecting socket to {}", ctx.url);

        let task = tokio::spawn(run_transport(ctx, outgoing_rx, shutdown.clone()));
        *transport = Some(Transport {
            outgoing,
            shutdown,
            task,
        });
        Ok(())
    }

    /// Stop the transport; pending reconnects are abandoned.
    pub fn disconnect(&self) {
        if let Some(transport) = self.transport.lock().take() {
            debug!("Disconnecting socket");
            transport.shutdown.cancel();
        }
        self.shared.set_disconnected();
    }

    /// Queue an event. Frames emitted while (re)connecting are flushed once
    /// the handshake completes.
    pub fn emit(&self, event: &str, data: &Value) -> ChatResult<()> {
        let transport = self.transport.lock();
        match transport.as_ref() {
            Some(transport) if transport.is_running() => transport
                .outgoing
                .send(encode_event(event, data))
                .map_err(|_| ChatError::NotConnected),
            _ => Err(ChatError::NotConnected),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Server-assigned socket id while connected.
    pub fn id(&self) -> Option<String> {
        self.shared.socket_id.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.get_mut().take() {
            transport.shutdown.cancel();
        }
    }
}

struct TransportContext {
    url: String,
    auth: Option<Value>,
    options: ConnectionOptions,
    shared: Arc<Shared>,
}

enum SessionEnd {
    Shutdown,
    ServerDisconnect,
    Lost { reason: String },
    Failed(ChatError),
}

async fn run_transport(
    ctx: TransportContext,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
) {
    let backoff = ctx.options.backoff();
    let mut attempt: u32 = 0;

    loop {
        match run_session(&ctx, &mut outgoing, &shutdown, attempt).await {
            SessionEnd::Shutdown => break,
            SessionEnd::ServerDisconnect => {
                info!("Socket disconnected by server");
                ctx.shared
                    .emit(SocketEvent::Disconnect { reason: "io server disconnect".into() });
                break;
            }
            SessionEnd::Lost { reason } => {
                warn!("Socket connection lost: {}", reason);
                ctx.shared.emit(SocketEvent::Disconnect { reason });
                attempt = 0;
            }
            SessionEnd::Failed(err) => {
                warn!("Socket connect failed: {}", err);
                ctx.shared
                    .emit(SocketEvent::ConnectError { message: err.to_string() });
            }
        }

        if !ctx.options.reconnection || attempt >= ctx.options.reconnection_attempts {
            warn!("Socket reconnection gave up after {} attempts", attempt);
            break;
        }

        let delay = calculate_backoff_delay(attempt, &backoff);
        attempt += 1;
        ctx.shared.set_state(ConnectionState::Reconnecting);
        debug!("Socket reconnect attempt {} in {}ms", attempt, delay);

        if !cancelable_delay(delay, &shutdown).await {
            break;
        }
    }

    if !shutdown.is_cancelled() {
        ctx.shared.set_disconnected();
    }
    debug!("Socket transport stopped");
}

struct Handshake {
    open: OpenPacket,
    socket_id: Option<String>,
}

async fn run_session(
    ctx: &TransportContext,
    outgoing: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &CancellationToken,
    attempt: u32,
) -> SessionEnd {
    let connecting = async {
        let (ws, _) = connect_async(ctx.url.as_str()).await?;
        let (mut writer, mut reader) = ws.split();
        let handshake = handshake(&mut reader, &mut writer, ctx.auth.as_ref()).await?;
        Ok::<_, ChatError>((writer, reader, handshake))
    };

    let timeout = Duration::from_millis(ctx.options.timeout_ms);
    let (mut writer, mut reader, handshake) = tokio::select! {
        _ = shutdown.cancelled() => return SessionEnd::Shutdown,
        result = tokio::time::timeout(timeout, connecting) => match result {
            Ok(Ok(parts)) => parts,
            Ok(Err(err)) => return SessionEnd::Failed(err),
            Err(_) => return SessionEnd::Failed(ChatError::network("Socket connect timed out")),
        },
    };

    info!("Socket connected (sid={:?})", handshake.socket_id);
    ctx.shared.set_connected(handshake.socket_id.clone());
    ctx.shared.emit(SocketEvent::Connect {
        socket_id: handshake.socket_id,
    });
    if attempt > 0 {
        ctx.shared.emit(SocketEvent::Reconnect { attempt });
    }

    let ping_window =
        Duration::from_millis(handshake.open.ping_interval + handshake.open.ping_timeout);
    let ping_deadline = tokio::time::sleep(ping_window);
    tokio::pin!(ping_deadline);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = writer.send(Message::Text(DISCONNECT.into())).await;
                let _ = writer.close().await;
                ctx.shared.emit(SocketEvent::Disconnect { reason: "io client disconnect".into() });
                return SessionEnd::Shutdown;
            }
            Some(frame) = outgoing.recv() => {
                if let Err(e) = writer.send(Message::Text(frame.into())).await {
                    return SessionEnd::Lost { reason: format!("transport error: {}", e) };
                }
            }
            _ = &mut ping_deadline => {
                return SessionEnd::Lost { reason: "ping timeout".into() };
            }
            incoming = reader.next() => match incoming {
                Some(Ok(Message::Text(text))) => match decode_packet(text.as_str()) {
                    Ok(EnginePacket::Ping) => {
                        ping_deadline.as_mut().reset(Instant::now() + ping_window);
                        if let Err(e) = writer.send(Message::Text(PONG.into())).await {
                            return SessionEnd::Lost { reason: format!("transport error: {}", e) };
                        }
                    }
                    Ok(EnginePacket::Close) => {
                        return SessionEnd::Lost { reason: "transport close".into() };
                    }
                    Ok(EnginePacket::Message(SocketPacket::Event { name, data })) => {
                        debug!("Socket event '{}'", name);
                        ctx.shared.emit(SocketEvent::from_server_event(name, data));
                    }
                    Ok(EnginePacket::Message(SocketPacket::Disconnect)) => {
                        return SessionEnd::ServerDisconnect;
                    }
                    Ok(EnginePacket::Message(SocketPacket::ConnectError(data))) => {
                        ctx.shared.emit(SocketEvent::Error { message: connect_error_message(&data) });
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Dropping undecodable socket packet: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::Lost { reason: "transport close".into() };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return SessionEnd::Lost { reason: format!("transport error: {}", e) };
                }
            }
        }
    }
}

/// Engine OPEN, then Socket.IO CONNECT with auth and wait for the ack.
async fn handshake(
    reader: &mut WsReader,
    writer: &mut WsWriter,
    auth: Option<&Value>,
) -> ChatResult<Handshake> {
    let open = loop {
        match next_packet(reader).await? {
            EnginePacket::Open(open) => break open,
            EnginePacket::Ping => writer.send(Message::Text(PONG.into())).await?,
            _ => {}
        }
    };

    writer.send(Message::Text(encode_connect(auth).into())).await?;

    loop {
        match next_packet(reader).await? {
            EnginePacket::Message(SocketPacket::Connect(data)) => {
                let socket_id = data
                    .as_ref()
                    .and_then(|d| d.get("sid"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return Ok(Handshake { open, socket_id });
            }
            EnginePacket::Message(SocketPacket::ConnectError(data)) => {
                return Err(ChatError::auth(connect_error_message(&data)));
            }
            EnginePacket::Ping => writer.send(Message::Text(PONG.into())).await?,
            _ => {}
        }
    }
}

async fn next_packet(reader: &mut WsReader) -> ChatResult<EnginePacket> {
    loop {
        match reader.next().await {
            Some(Ok(Message::Text(text))) => return decode_packet(text.as_str()),
            Some(Ok(Message::Close(_))) | None => {
                return Err(ChatError::network("Socket closed during handshake"))
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(url: &str, path: &str) -> SocketConnection {
        SocketConnection::new(
            SocketEndpoint {
                url: url.to_string(),
                path: path.to_string(),
            },
            ConnectionOptions::default(),
        )
    }

    #[test]
    fn test_websocket_url() {
        let conn = connection("http://localhost:3501", "/chat-socket");
        assert_eq!(
            conn.websocket_url().unwrap(),
            "ws://localhost:3501/chat-socket/?EIO=4&transport=websocket"
        );

        let conn = connection("https://rt.example.com", "/api/chat-socket");
        assert_eq!(
            conn.websocket_url().unwrap(),
            "wss://rt.example.com/api/chat-socket/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_websocket_url_rejects_unknown_scheme() {
        let conn = connection("ftp://example.com", "/chat-socket");
        assert!(matches!(conn.websocket_url(), Err(ChatError::Config { .. })));
    }

    #[test]
    fn test_emit_before_connect_fails() {
        let conn = connection("http://localhost:3501", "/chat-socket");
        assert!(matches!(
            conn.emit("typing", &Value::Null),
            Err(ChatError::NotConnected)
        ));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.id().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_stops_transport() {
        let conn = connection("http://127.0.0.1:9", "/chat-socket");
        conn.connect().unwrap();
        assert!(conn.emit("typing", &Value::Null).is_ok());

        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(matches!(
            conn.emit("typing", &Value::Null),
            Err(ChatError::NotConnected)
        ));
    }
}
