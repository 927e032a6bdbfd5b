//! Engine.IO v4 / Socket.IO v5 text packet codec
//!
//! Only the subset spoken over a plain websocket transport on the default
//! namespace is supported:
//!
//! ```text
//! 0{...}        engine OPEN (sid, pingInterval, pingTimeout)
//! 2 / 3         engine PING / PONG
//! 40{auth}      socket CONNECT (client) / 40{"sid":..} (server ack)
//! 41            socket DISCONNECT
//! 42["ev",data] socket EVENT
//! 44{...}       socket CONNECT_ERROR
//! ```
//!
//! Namespaces and ack ids on inbound packets are skipped. Binary packets are
//! not supported and decode to [`SocketPacket::Unsupported`].

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ChatError, ChatResult};

/// Engine-level PONG.
pub const PONG: &str = "3";
/// Socket-level DISCONNECT.
pub const DISCONNECT: &str = "41";

/// Engine OPEN handshake data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    pub sid: String,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25000
}
fn default_ping_timeout() -> u64 {
    20000
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenPacket),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, data: Value },
    ConnectError(Value),
    Unsupported,
}

/// Decode one websocket text frame.
pub fn decode_packet(text: &str) -> ChatResult<EnginePacket> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ChatError::protocol("Empty engine packet"))?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(EnginePacket::Open(serde_json::from_str(rest)?)),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => decode_socket_packet(rest).map(EnginePacket::Message),
        '5' | '6' => Ok(EnginePacket::Noop),
        other => Err(ChatError::protocol(format!(
            "Unknown engine packet type '{}'",
            other
        ))),
    }
}

fn decode_socket_packet(text: &str) -> ChatResult<SocketPacket> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| ChatError::protocol("Empty socket packet"))?;

    let mut rest = chars.as_str();
    if rest.starts_with('/') {
        rest = rest.split_once(',').map(|(_, tail)| tail).unwrap_or("");
    }
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    match kind {
        '0' => {
            if rest.is_empty() {
                Ok(SocketPacket::Connect(None))
            } else {
                Ok(SocketPacket::Connect(Some(serde_json::from_str(rest)?)))
            }
        }
        '1' => Ok(SocketPacket::Disconnect),
        '2' => {
            let mut items = match serde_json::from_str::<Value>(rest)? {
                Value::Array(items) => items.into_iter(),
                _ => return Err(ChatError::protocol("Event packet is not an array")),
            };
            let name = match items.next() {
                Some(Value::String(name)) => name,
                _ => return Err(ChatError::protocol("Event packet has no name")),
            };
            Ok(SocketPacket::Event {
                name,
                data: items.next().unwrap_or(Value::Null),
            })
        }
        '4' => Ok(SocketPacket::ConnectError(
            serde_json::from_str(rest).unwrap_or_else(|_| Value::String(rest.to_string())),
        )),
        '3' | '5' | '6' => Ok(SocketPacket::Unsupported),
        other => Err(ChatError::protocol(format!(
            "Unknown socket packet type '{}'",
            other
        ))),
    }
}

/// `40` with the auth payload, if any.
pub fn encode_connect(auth: Option<&Value>) -> String {
    match auth {
        Some(auth) => format!("40{}", auth),
        None => "40".to_string(),
    }
}

/// `42["name",data]`
pub fn encode_event(name: &str, data: &Value) -> String {
    format!("42{}", json!([name, data]))
}

/// Human-readable text of a CONNECT_ERROR payload.
pub fn connect_error_message(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_open() {
        let packet =
            decode_packet(r#"0{"sid":"abc","upgrades":[],"pingInterval":300,"pingTimeout":200}"#)
                .unwrap();
        assert_eq!(
            packet,
            EnginePacket::Open(OpenPacket {
                sid: "abc".into(),
                ping_interval: 300,
                ping_timeout: 200,
            })
        );
    }

    #[test]
    fn test_decode_ping_and_close() {
        assert_eq!(decode_packet("2").unwrap(), EnginePacket::Ping);
        assert_eq!(decode_packet("2probe").unwrap(), EnginePacket::Ping);
        assert_eq!(decode_packet("1").unwrap(), EnginePacket::Close);
        assert_eq!(decode_packet("6").unwrap(), EnginePacket::Noop);
    }

    #[test]
    fn test_decode_connect_ack() {
        assert_eq!(
            decode_packet(r#"40{"sid":"s-1"}"#).unwrap(),
            EnginePacket::Message(SocketPacket::Connect(Some(json!({"sid": "s-1"}))))
        );
        assert_eq!(
            decode_packet("40").unwrap(),
            EnginePacket::Message(SocketPacket::Connect(None))
        );
    }

    #[test]
    fn test_decode_event() {
        assert_eq!(
            decode_packet(r#"42["typing",{"isTyping":true}]"#).unwrap(),
            EnginePacket::Message(SocketPacket::Event {
                name: "typing".into(),
                data: json!({"isTyping": true}),
            })
        );
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack_id() {
        assert_eq!(
            decode_packet(r#"42/chat,17["ping"]"#).unwrap(),
            EnginePacket::Message(SocketPacket::Event {
                name: "ping".into(),
                data: Value::Null,
            })
        );
    }

    #[test]
    fn test_decode_connect_error() {
        let packet = decode_packet(r#"44{"message":"invalid key"}"#).unwrap();
        match packet {
            EnginePacket::Message(SocketPacket::ConnectError(data)) => {
                assert_eq!(connect_error_message(&data), "invalid key")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_packet("").is_err());
        assert!(decode_packet("x").is_err());
        assert!(decode_packet(r#"42{"not":"array"}"#).is_err());
        assert!(decode_packet("42[1,2]").is_err());
    }

    #[test]
    fn test_encode() {
        assert_eq!(encode_connect(None), "40");
        assert_eq!(
            encode_connect(Some(&json!({"x-widget-key": "k"}))),
            r#"40{"x-widget-key":"k"}"#
        );
        assert_eq!(
            encode_event("typing", &json!({"isTyping": false})),
            r#"42["typing",{"isTyping":false}]"#
        );
    }
}
