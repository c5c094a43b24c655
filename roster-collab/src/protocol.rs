//! JSON wire protocol for the collaboration channel.
//!
//! Wire format (one JSON object per text frame, tagged by `type`):
//! ```text
//! { "type": "ping" }
//! { "type": "start_editing", "payload": { "recordId": 42, "userName": "alice" } }
//! { "type": "stop_editing",  "payload": { "recordId": 42, "userName": "alice" } }
//! { "type": "editing_status_update", "payload": { "recordId": 42, "users": ["alice", "bob"] } }
//! { "type": "user_connected", "user": { "id": 7, "name": "…", "email": "…", "isActive": true, "description": "…" } }
//! ```
//!
//! The variant set is closed. Frames that are not JSON, carry no `type`,
//! carry an unknown `type` or a payload that does not fit their `type`
//! are rejected by [`WireMessage::decode`] and never reach subscribers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Every `type` tag the codec understands.
pub const KNOWN_TYPES: &[&str] = &[
    "ping",
    "pong",
    "start_editing",
    "stop_editing",
    "editing_status_update",
    "user_connected",
    "user_disconnected",
    "user_updated",
    "message",
    "error",
];

/// Identifier of a user record as it travels on the wire.
///
/// Always encoded as a JSON number. Decoding also accepts a string of
/// decimal digits (`"42"`), which older clients send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coerces a string id: surrounding whitespace is ignored, anything other
/// than an unsigned decimal integer is rejected.
impl FromStr for RecordId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodecError::InvalidRecordId(s.to_owned()));
        }
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| CodecError::InvalidRecordId(s.to_owned()))
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Loosely typed identifier used by the domain payloads (users, chat).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(u64),
    Text(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A user row as broadcast by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: EntityId,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    #[serde(default)]
    pub description: String,
}

/// Free-form chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: EntityId,
    pub content: String,
    pub timestamp: String,
    pub user_id: EntityId,
}

/// Payload of `start_editing` / `stop_editing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditingAnnouncement {
    pub record_id: RecordId,
    pub user_name: String,
}

/// Payload of `editing_status_update`: everyone the server believes is
/// editing `record_id`, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditingStatus {
    pub record_id: RecordId,
    pub users: Vec<String>,
}

/// Top-level protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Keep-alive probe
    Ping,
    /// Keep-alive answer
    Pong,
    StartEditing {
        payload: EditingAnnouncement,
    },
    StopEditing {
        payload: EditingAnnouncement,
    },
    EditingStatusUpdate {
        payload: EditingStatus,
    },
    UserConnected {
        user: UserRecord,
    },
    UserDisconnected {
        #[serde(rename = "userId")]
        user_id: EntityId,
    },
    UserUpdated {
        user: UserRecord,
    },
    Message {
        message: ChatMessage,
    },
    Error {
        error: String,
    },
}

impl WireMessage {
    pub fn start_editing(record_id: RecordId, user_name: impl Into<String>) -> Self {
        Self::StartEditing {
            payload: EditingAnnouncement {
                record_id,
                user_name: user_name.into(),
            },
        }
    }

    pub fn stop_editing(record_id: RecordId, user_name: impl Into<String>) -> Self {
        Self::StopEditing {
            payload: EditingAnnouncement {
                record_id,
                user_name: user_name.into(),
            },
        }
    }

    pub fn editing_status(record_id: RecordId, users: Vec<String>) -> Self {
        Self::EditingStatusUpdate {
            payload: EditingStatus { record_id, users },
        }
    }

    /// The wire `type` tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::StartEditing { .. } => "start_editing",
            Self::StopEditing { .. } => "stop_editing",
            Self::EditingStatusUpdate { .. } => "editing_status_update",
            Self::UserConnected { .. } => "user_connected",
            Self::UserDisconnected { .. } => "user_disconnected",
            Self::UserUpdated { .. } => "user_updated",
            Self::Message { .. } => "message",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Serialize)
    }

    /// Parse and validate a text frame.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(CodecError::Malformed)?;

        let kind = match value.get("type").and_then(serde_json::Value::as_str) {
            Some(kind) => kind.to_owned(),
            None => return Err(CodecError::MissingType),
        };
        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(CodecError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|source| CodecError::InvalidPayload { kind, source })
    }
}

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("Frame has no string `type` field")]
    MissingType,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Invalid payload for `{kind}`: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid record id: {0:?}")]
    InvalidRecordId(String),
    #[error("Serialization error: {0}")]
    Serialize(#[source] serde_json::Error),
}
