//! Inbound event dispatch: authorization, persistence, then broadcast.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::error::DispatchError;
use crate::store::MessageStore;

use super::events::{ClientEvent, SendMessagePayload, ServerEvent};
use super::rooms::{RoomId, RoomRegistry};
use super::session::GatewaySession;

/// Bound on a single persistence call. A store that exceeds it is treated
/// as failed and nothing is broadcast.
const PERSIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Maps validated client events onto authorized side effects and broadcasts.
pub struct EventDispatcher {
    rooms: Arc<RoomRegistry>,
    store: Arc<dyn MessageStore>,
}

impl EventDispatcher {
    pub fn new(rooms: Arc<RoomRegistry>, store: Arc<dyn MessageStore>) -> Self {
        Self { rooms, store }
    }

    /// Single entry point for every named client event.
    ///
    /// An `Err` concerns only the acting session: the caller reports it back
    /// on that connection, and nothing has been broadcast.
    pub async fn dispatch(
        &self,
        session: &GatewaySession,
        event: ClientEvent,
    ) -> Result<(), DispatchError> {
        match event {
            ClientEvent::RoomJoin(p) => {
                // Silent success; no ack event is defined for joins.
                self.rooms
                    .join(&RoomId::new(p.conversation_id), &session.session_id);
                Ok(())
            }
            ClientEvent::RoomLeave(p) => {
                self.rooms
                    .leave(&RoomId::new(p.conversation_id), &session.session_id);
                Ok(())
            }
            ClientEvent::MessageSend(p) => self.send_message(session, p).await,
            ClientEvent::TypingStart(p) => {
                self.typing(session, p.conversation_id, true);
                Ok(())
            }
            ClientEvent::TypingStop(p) => {
                self.typing(session, p.conversation_id, false);
                Ok(())
            }
        }
    }

    /// Persist through the store, then fan out to the room.
    ///
    /// Sending is authorized by conversation participation, not by socket
    /// room membership: a participant who never joined the room may post,
    /// and only joined sockets receive the broadcast.
    async fn send_message(
        &self,
        session: &GatewaySession,
        payload: SendMessagePayload,
    ) -> Result<(), DispatchError> {
        let room = RoomId::new(payload.conversation_id);

        let stored = time::timeout(
            PERSIST_TIMEOUT,
            self.store
                .create_message(room.as_str(), &session.identity, &payload.content),
        )
        .await
        .map_err(|_| {
            tracing::error!(room = %room, "message store timed out");
            DispatchError::Persistence("Storage timeout".to_string())
        })??;

        let delivered = self.rooms.broadcast(&room, ServerEvent::from(stored), None);
        tracing::debug!(room = %room, delivered, "message fanned out");
        Ok(())
    }

    /// Typing indicators are stateless pass-throughs, never echoed back to
    /// their author.
    fn typing(&self, session: &GatewaySession, conversation_id: String, is_typing: bool) {
        let room = RoomId::new(conversation_id);
        let event = ServerEvent::TypingUpdate {
            user_id: session.identity.id.clone(),
            is_typing,
            conversation_id: room.as_str().to_string(),
        };
        self.rooms.broadcast(&room, event, Some(&session.session_id));
    }
}
