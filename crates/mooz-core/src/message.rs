//! The wire envelope exchanged over every hub connection.
//!
//! ```json
//! { "to": "<id>"?, "from": "<id>"?, "type": "<string>", "data": <any>? }
//! ```
//!
//! `from` is stamped by the receiving session before a message is routed;
//! whatever the client put there is overwritten. Empty `to`/`from` strings
//! are read as absent, and absent fields are omitted when writing.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::ClientId;

/// Message `type` vocabulary.
///
/// Anything outside the reserved names is carried as [`MessageType::Custom`]
/// and routed without looking at `data`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Server -> client liveness probe; `data` is the probe stamp.
    Ping,
    /// Client -> server acknowledgment; `data` is the acknowledged stamp.
    Pong,
    /// Server -> self, once the session is fully running.
    Initialized,
    /// Broadcast when a client joins; `from` is the new client.
    Joined,
    /// Broadcast when a client leaves; `from` is the departing client.
    Left,
    /// Application-defined passthrough type.
    Custom(String),
}

impl MessageType {
    /// Wire name of this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Initialized => "initialized",
            Self::Joined => "joined",
            Self::Left => "left",
            Self::Custom(s) => s,
        }
    }
}

impl From<String> for MessageType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "initialized" => Self::Initialized,
            "joined" => Self::Joined,
            "left" => Self::Left,
            _ => Self::Custom(s),
        }
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Custom(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routed hub message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Addressed recipient, if any.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty_id"
    )]
    pub to: Option<ClientId>,
    /// Originating client, stamped by the hub.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty_id"
    )]
    pub from: Option<ClientId>,
    /// Message type.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn non_empty_id<'de, D>(deserializer: D) -> Result<Option<ClientId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(ClientId::from))
}

impl Message {
    /// Create a bare message of the given type.
    pub fn new(kind: impl Into<MessageType>) -> Self {
        Self {
            to: None,
            from: None,
            kind: kind.into(),
            data: None,
        }
    }

    /// Set the recipient.
    #[must_use]
    pub fn addressed_to(mut self, id: ClientId) -> Self {
        self.to = Some(id);
        self
    }

    /// Set the sender.
    #[must_use]
    pub fn sent_by(mut self, id: ClientId) -> Self {
        self.from = Some(id);
        self
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Probe sent to `to` carrying `stamp`.
    pub fn ping(to: ClientId, stamp: i64) -> Self {
        Self::new(MessageType::Ping).addressed_to(to).with_data(stamp)
    }

    /// Acknowledgment of `stamp` (what a client answers to a ping).
    pub fn pong(stamp: i64) -> Self {
        Self::new(MessageType::Pong).with_data(stamp)
    }

    /// Sent to a session's own client once all of its roles are running.
    pub fn initialized() -> Self {
        Self::new(MessageType::Initialized)
    }

    /// Announcement that `id` joined.
    pub fn joined(id: ClientId) -> Self {
        Self::new(MessageType::Joined).sent_by(id)
    }

    /// Announcement that `id` left.
    pub fn left(id: ClientId) -> Self {
        Self::new(MessageType::Left).sent_by(id)
    }

    /// Extract the probe stamp carried by a `pong`.
    ///
    /// Clients written in JavaScript echo numbers back as floats, so any
    /// finite JSON number is accepted and truncated.
    pub fn probe_stamp(&self) -> Result<i64, ProtocolError> {
        let malformed = || {
            ProtocolError::MalformedPong(
                self.data
                    .as_ref()
                    .map_or_else(|| "null".to_owned(), Value::to_string),
            )
        };
        let data = self.data.as_ref().ok_or_else(malformed)?;
        if let Some(n) = data.as_i64() {
            return Ok(n);
        }
        match data.as_f64() {
            Some(f) if f.is_finite() => Ok(f as i64),
            _ => Err(malformed()),
        }
    }
}
