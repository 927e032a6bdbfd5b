//! Message model
//!
//! [`Message`] is the atomic transcript unit. Messages are created in three
//! places: optimistically by the widget (user echo, assistant placeholder),
//! from history pages, and from socket payloads. The latter two go through
//! explicit wire records ([`HistoryMessageRecord`], [`IncomingMessagePayload`])
//! that are decoded once at the network boundary and normalized into
//! [`Message`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Raw sender tag used by the service for the local user.
pub const SENDER_CUSTOMER: &str = "Customer";
/// Display label for the local user.
pub const SENDER_YOU: &str = "You";
/// Default label for assistant output.
pub const SENDER_ASSISTANT: &str = "Assistant";
/// Raw sender tag for human agents.
pub const SENDER_EMPLOYEE: &str = "Employee";

/// Channel tag stamped on locally created messages.
pub const LOCAL_CHANNEL: &str = "Web";
/// Channel tag used when a socket payload carries none.
pub const SOCKET_CHANNEL: &str = "chat-widget";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Text,
    System,
    TypingIndicator,
}

impl MessageKind {
    /// Lenient mapping from the wire `msgType`. Unknown types render as text.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "system" => Self::System,
            "typing-indicator" => Self::TypingIndicator,
            _ => Self::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub from_me: bool,
    #[serde(rename = "msgType")]
    pub kind: MessageKind,
    pub text: String,
    #[serde(rename = "senderBy")]
    pub sender_label: String,
    pub channel: String,
    /// ISO-8601, the only chronological sort key
    pub created_at: String,
    /// The id is client-generated and no server record has claimed it yet
    #[serde(skip)]
    pub pending: bool,
}

impl Message {
    /// Optimistic echo of something the local user typed.
    pub fn outgoing(text: impl Into<String>) -> Self {
        Self {
            id: generate_message_id(),
            from_me: true,
            kind: MessageKind::Text,
            text: text.into(),
            sender_label: SENDER_YOU.to_string(),
            channel: LOCAL_CHANNEL.to_string(),
            created_at: now_iso(),
            pending: true,
        }
    }

    /// Empty typing-indicator message attributed to `sender`.
    pub fn typing_indicator(sender: impl Into<String>) -> Self {
        Self {
            id: generate_message_id(),
            from_me: false,
            kind: MessageKind::TypingIndicator,
            text: String::new(),
            sender_label: sender.into(),
            channel: LOCAL_CHANNEL.to_string(),
            created_at: now_iso(),
            pending: true,
        }
    }

    pub fn is_peer_typing_indicator(&self) -> bool {
        !self.from_me && self.kind == MessageKind::TypingIndicator
    }

    /// Parsed `created_at`, `None` when the timestamp is malformed.
    pub fn timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|dt| dt.with_timezone(&chrono::Utc))
    }
}

/// Client-side placeholder id.
pub fn generate_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Maps a raw sender tag to its display label.
pub fn sender_label_for(raw: &str) -> String {
    if raw.eq_ignore_ascii_case(SENDER_CUSTOMER) || raw.eq_ignore_ascii_case(SENDER_YOU) {
        SENDER_YOU.to_string()
    } else {
        raw.to_string()
    }
}

/// Ownership check used when a record carries no explicit `fromMe`.
pub fn is_local_sender(raw: &str) -> bool {
    raw.eq_ignore_ascii_case(SENDER_CUSTOMER) || raw.eq_ignore_ascii_case(SENDER_YOU)
}

/// Message record as returned by the history endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessageRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub from_me: Option<bool>,
    #[serde(default)]
    pub msg_type: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sender_by: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl HistoryMessageRecord {
    pub fn into_message(self) -> Message {
        let sender = self.sender_by.unwrap_or_else(|| SENDER_ASSISTANT.to_string());
        let from_me = self.from_me.unwrap_or_else(|| is_local_sender(&sender));

        Message {
            id: self.id,
            from_me,
            kind: self
                .msg_type
                .as_deref()
                .map(MessageKind::from_wire)
                .unwrap_or(MessageKind::Text),
            text: self.text,
            sender_label: sender,
            channel: self.channel.unwrap_or_else(|| LOCAL_CHANNEL.to_string()),
            created_at: self.created_at.unwrap_or_else(now_iso),
            pending: false,
        }
    }
}

/// Message payload pushed over the socket (`chat:messages:received`).
///
/// The id may arrive as `_id` or `id`; the text either at the top level or
/// nested under `message.text`. Every field is optional and a field of the
/// wrong type counts as absent instead of failing the whole payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessagePayload {
    #[serde(rename = "_id", default, deserialize_with = "lenient_string")]
    pub underscore_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_nested_text")]
    pub message: Option<NestedMessageText>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sender_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub msg_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NestedMessageText {
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
}

/// Keeps string values, treats anything else as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// `message` is only read when it is an object.
fn lenient_nested_text<'de, D>(deserializer: D) -> Result<Option<NestedMessageText>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

impl IncomingMessagePayload {
    pub fn decode(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Normalize into a transcript message. Returns `None` when there is no
    /// text to show.
    pub fn normalize(self) -> Option<Message> {
        let text = self
            .text
            .filter(|t| !t.is_empty())
            .or_else(|| self.message.and_then(|m| m.text))
            .filter(|t| !t.is_empty())?;

        let raw_sender = self.sender_by.unwrap_or_else(|| SENDER_ASSISTANT.to_string());
        let from_me = raw_sender == SENDER_CUSTOMER;
        let sender_label = if from_me {
            SENDER_YOU.to_string()
        } else {
            raw_sender
        };

        Some(Message {
            id: self
                .underscore_id
                .or(self.id)
                .unwrap_or_else(generate_message_id),
            from_me,
            kind: self
                .msg_type
                .as_deref()
                .map(MessageKind::from_wire)
                .unwrap_or(MessageKind::Text),
            text,
            sender_label,
            channel: self.channel.unwrap_or_else(|| SOCKET_CHANNEL.to_string()),
            created_at: self.created_at.unwrap_or_else(now_iso),
            pending: false,
        })
    }
}
