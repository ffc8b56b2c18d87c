//! Per-connection session state.

use crate::auth::Identity;

use super::events::ServerEvent;
use super::rooms::SessionSender;

/// State for a single authenticated WebSocket connection.
///
/// Born at handshake, dies with the transport. The identity never changes
/// for the connection's lifetime; room subscriptions live in the registry's
/// participation record keyed by `session_id`.
pub struct GatewaySession {
    /// Unique session identifier (`ses_`-prefixed ULID).
    pub session_id: String,
    /// Authenticated principal resolved at handshake.
    pub identity: Identity,
    /// Handle to this session's outbound queue. The connection's own task
    /// drains the receiving end into the socket.
    sender: SessionSender,
}

impl GatewaySession {
    pub fn new(identity: Identity, sender: SessionSender) -> Self {
        Self {
            session_id: parley_common::id::prefixed_ulid(parley_common::id::prefix::SESSION),
            identity,
            sender,
        }
    }

    /// Queue an event for delivery to this connection only. Returns `false`
    /// if the connection's writer has already shut down.
    pub fn queue(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}
