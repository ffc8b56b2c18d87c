//! Wire-format events for the gateway socket protocol.
//!
//! Every frame is a JSON text message shaped `{"event": <name>, "data": {…}}`
//! with camelCase payload fields.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Identity;
use crate::error::DispatchError;
use crate::store::StoredMessage;

/// Envelope shared by every client frame.
#[derive(Debug, Deserialize)]
pub struct RawFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Payload of the `auth` handshake frame.
///
/// Not part of the named-event protocol; the server consumes it before any
/// [`ClientEvent`] is accepted.
#[derive(Debug, Deserialize)]
pub struct AuthFrame {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub conversation_id: String,
    pub content: String,
}

/// A named client → server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    RoomJoin(RoomPayload),
    RoomLeave(RoomPayload),
    MessageSend(SendMessagePayload),
    TypingStart(RoomPayload),
    TypingStop(RoomPayload),
}

impl ClientEvent {
    /// Parse a raw text frame into a protocol event.
    ///
    /// Malformed JSON and unknown event names are both protocol errors; the
    /// caller reports them to the sending connection only.
    pub fn parse(text: &str) -> Result<Self, DispatchError> {
        let frame: RawFrame = serde_json::from_str(text)
            .map_err(|_| DispatchError::Protocol("Invalid JSON frame".to_string()))?;

        match frame.event.as_str() {
            "room:join" => Ok(Self::RoomJoin(payload(frame.data)?)),
            "room:leave" => Ok(Self::RoomLeave(payload(frame.data)?)),
            "message:send" => Ok(Self::MessageSend(payload(frame.data)?)),
            "typing:start" => Ok(Self::TypingStart(payload(frame.data)?)),
            "typing:stop" => Ok(Self::TypingStop(payload(frame.data)?)),
            other => Err(DispatchError::Protocol(format!("Unknown event: {other}"))),
        }
    }
}

fn payload<T: DeserializeOwned>(data: Value) -> Result<T, DispatchError> {
    serde_json::from_value(data)
        .map_err(|_| DispatchError::Protocol("Malformed event payload".to_string()))
}

/// A named server → client event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Handshake acknowledgement, the only unsolicited confirmation the
    /// server sends.
    #[serde(rename = "ready", rename_all = "camelCase")]
    Ready { session_id: String, user: Identity },

    /// A message accepted by the store, fanned out to its room.
    #[serde(rename = "message:new", rename_all = "camelCase")]
    MessageNew {
        id: String,
        conversation_id: String,
        sender_id: String,
        #[serde(rename = "type")]
        kind: String,
        content: String,
        created_at: DateTime<Utc>,
    },

    /// Typing indicator change, never echoed back to its author.
    #[serde(rename = "typing:update", rename_all = "camelCase")]
    TypingUpdate {
        user_id: String,
        is_typing: bool,
        conversation_id: String,
    },

    /// Reported to the originating connection only.
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn error(err: &DispatchError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.message(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("server event serializes")
    }
}

impl From<StoredMessage> for ServerEvent {
    fn from(m: StoredMessage) -> Self {
        Self::MessageNew {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            kind: m.kind,
            content: m.content,
            created_at: m.created_at,
        }
    }
}
