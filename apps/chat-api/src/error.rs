use std::fmt;

use crate::store::StoreError;

/// Why a connection was rejected at the handshake.
///
/// No session exists yet when one of these is produced; the gateway closes
/// the socket with an authentication close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Token missing, malformed, or failed signature/claim checks.
    Invalid,
    /// Token was well-formed but past its expiry.
    Expired,
}

impl AuthError {
    /// Close-frame reason shown to the client.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Invalid => "Invalid token",
            AuthError::Expired => "Expired token",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// A failed client action.
///
/// Reported to the originating session only, as a single `error` event;
/// never broadcast and never visible to other room members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Malformed frame or unknown event kind. The connection stays open.
    Protocol(String),
    /// The sender is not a participant of the target conversation.
    NotParticipant,
    /// The message content failed validation.
    Validation(String),
    /// The persistence collaborator failed or timed out.
    Persistence(String),
}

impl DispatchError {
    /// Stable machine-readable code carried on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Protocol(_) => "PROTOCOL_ERROR",
            DispatchError::NotParticipant => "NOT_PARTICIPANT",
            DispatchError::Validation(_) => "VALIDATION_FAILURE",
            DispatchError::Persistence(_) => "PERSISTENCE_FAILURE",
        }
    }

    /// Human-readable message carried alongside the code.
    pub fn message(&self) -> String {
        match self {
            DispatchError::Protocol(m) | DispatchError::Validation(m) | DispatchError::Persistence(m) => {
                m.clone()
            }
            DispatchError::NotParticipant => {
                "You are not a participant of this conversation".to_string()
            }
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotParticipant => DispatchError::NotParticipant,
            StoreError::Validation(m) => DispatchError::Validation(m),
            StoreError::Unavailable(m) => {
                tracing::error!(error = %m, "message store failure");
                DispatchError::Persistence("Failed to store message".to_string())
            }
        }
    }
}
