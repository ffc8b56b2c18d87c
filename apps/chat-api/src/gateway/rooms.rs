//! Conversation room membership and broadcast fan-out.
//!
//! The registry is the only state shared across connection tasks. Uses
//! `DashMap` for shard-level concurrency and `parking_lot::Mutex` per
//! session record for non-poisoning, fast locking. Guards on one map are
//! always released before touching the other.

use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::events::ServerEvent;

/// Identifier of a broadcast room, keyed by conversation id.
///
/// A dedicated type rather than a bare string so room keys cannot collide
/// with other string namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outbound queue handle for one connected session.
pub type SessionSender = mpsc::UnboundedSender<ServerEvent>;

/// Registry-side participation record for one live session.
struct SessionEntry {
    sender: SessionSender,
    rooms: HashSet<RoomId>,
}

/// Room membership registry shared by all connection tasks.
///
/// Membership is bidirectional: a session id in a room's member set always
/// has that room in its own record, and vice versa. Per-session event
/// ordering is the connection task's job; the registry only promises that
/// each broadcast sees a consistent membership snapshot.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, HashSet<String>>,
    sessions: DashMap<String, Mutex<SessionEntry>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Register a session's outbound queue after a successful handshake.
    pub fn register(&self, session_id: &str, sender: SessionSender) {
        self.sessions.insert(
            session_id.to_string(),
            Mutex::new(SessionEntry {
                sender,
                rooms: HashSet::new(),
            }),
        );
    }

    /// Subscribe a session to a room. Joining a room already joined is a
    /// no-op, not an error.
    pub fn join(&self, room: &RoomId, session_id: &str) {
        let newly_joined = match self.sessions.get(session_id) {
            Some(entry) => entry.lock().rooms.insert(room.clone()),
            // Session already cleaned up; the disconnect won the race.
            None => return,
        };
        if newly_joined {
            self.rooms
                .entry(room.clone())
                .or_default()
                .insert(session_id.to_string());
        }
    }

    /// Unsubscribe a session from a room. Leaving a room never joined is a
    /// no-op.
    pub fn leave(&self, room: &RoomId, session_id: &str) {
        let was_member = match self.sessions.get(session_id) {
            Some(entry) => entry.lock().rooms.remove(room),
            None => false,
        };
        if was_member {
            self.remove_member(room, session_id);
        }
    }

    /// Deliver `event` to every session in the room's member set as of this
    /// call, except `exclude`. A member whose queue is closed is logged,
    /// removed, and does not affect delivery to the rest.
    ///
    /// Returns the number of sessions the event was queued for.
    pub fn broadcast(&self, room: &RoomId, event: ServerEvent, exclude: Option<&str>) -> usize {
        // Snapshot the member set; the guard must not be held while session
        // records are locked.
        let members: Vec<String> = match self.rooms.get(room) {
            Some(set) => set.iter().cloned().collect(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut dead: Vec<String> = Vec::new();
        for session_id in members {
            if exclude == Some(session_id.as_str()) {
                continue;
            }
            let sent = match self.sessions.get(&session_id) {
                Some(entry) => entry.lock().sender.send(event.clone()).is_ok(),
                // Removed between snapshot and delivery.
                None => continue,
            };
            if sent {
                delivered += 1;
            } else {
                dead.push(session_id);
            }
        }

        for session_id in dead {
            tracing::warn!(%session_id, room = %room, "dropping session with closed outbound queue");
            self.remove_session(&session_id);
        }

        delivered
    }

    /// Remove a session from every room it joined and drop its queue
    /// handle. Idempotent: duplicate disconnect signals are safe.
    pub fn remove_session(&self, session_id: &str) {
        let Some((_, entry)) = self.sessions.remove(session_id) else {
            return;
        };
        for room in entry.into_inner().rooms {
            self.remove_member(&room, session_id);
        }
    }

    /// Number of members currently in a room.
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    /// Rooms a session is currently subscribed to.
    pub fn rooms_of(&self, session_id: &str) -> HashSet<RoomId> {
        self.sessions
            .get(session_id)
            .map(|e| e.lock().rooms.clone())
            .unwrap_or_default()
    }

    /// Remove one member from a room's set, dropping the room entry once it
    /// empties (memory hygiene, observably a no-op to clients).
    fn remove_member(&self, room: &RoomId, session_id: &str) {
        let emptied = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(session_id);
                members.is_empty()
            }
            None => false,
        };
        if emptied {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }
}
