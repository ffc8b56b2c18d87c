//! Message persistence collaborator.
//!
//! The gateway consumes this seam and never looks behind it: participant
//! authorization is a property of the conversation record, independent of
//! which sockets happen to be subscribed to the conversation's room.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::auth::Identity;

/// Maximum message content length.
pub const MAX_CONTENT_LEN: usize = 4000;

/// A message accepted and persisted by the store.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// `msg_`-prefixed ULID.
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    /// Message kind; `"text"` for client-authored messages.
    pub kind: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Why the store refused (or failed) to persist a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The sender is not a participant of the conversation.
    NotParticipant,
    /// The content failed validation; the payload names the problem.
    Validation(String),
    /// The backing store is unreachable or errored.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotParticipant => f.write_str("sender is not a participant"),
            StoreError::Validation(m) => write!(f, "validation failed: {m}"),
            StoreError::Unavailable(m) => write!(f, "store unavailable: {m}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persists messages after checking conversation-participant authorization.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(
        &self,
        conversation_id: &str,
        sender: &Identity,
        content: &str,
    ) -> Result<StoredMessage, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (single-process deployments / tests)
// ---------------------------------------------------------------------------

struct Conversation {
    participants: HashSet<String>,
    messages: Vec<StoredMessage>,
}

/// DashMap-backed store. A relational store implements the same trait in
/// larger deployments.
pub struct MemoryMessageStore {
    conversations: DashMap<String, Conversation>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            conversations: DashMap::new(),
        }
    }

    /// Create a conversation with the given participant set.
    pub fn create_conversation(&self, conversation_id: &str, participants: &[&str]) {
        self.conversations.insert(
            conversation_id.to_string(),
            Conversation {
                participants: participants.iter().map(|p| p.to_string()).collect(),
                messages: Vec::new(),
            },
        );
    }

    /// Number of messages stored for a conversation.
    pub fn message_count(&self, conversation_id: &str) -> usize {
        self.conversations
            .get(conversation_id)
            .map(|c| c.messages.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn create_message(
        &self,
        conversation_id: &str,
        sender: &Identity,
        content: &str,
    ) -> Result<StoredMessage, StoreError> {
        // Authorization first. An unknown conversation reads the same as a
        // known one the sender is not in, so existence is not leaked.
        let mut conversation = self
            .conversations
            .get_mut(conversation_id)
            .ok_or(StoreError::NotParticipant)?;
        if !conversation.participants.contains(&sender.id) {
            return Err(StoreError::NotParticipant);
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::Validation(
                "Message content is required".to_string(),
            ));
        }
        if content.len() > MAX_CONTENT_LEN {
            return Err(StoreError::Validation(
                "Message content must be 4000 characters or fewer".to_string(),
            ));
        }

        let message = StoredMessage {
            id: parley_common::id::prefixed_ulid(parley_common::id::prefix::MESSAGE),
            conversation_id: conversation_id.to_string(),
            sender_id: sender.id.clone(),
            kind: "text".to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        conversation.messages.push(message.clone());
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            username: format!("user-{id}"),
        }
    }

    fn store_with_conversation() -> MemoryMessageStore {
        let store = MemoryMessageStore::new();
        store.create_conversation("conv_1", &["usr_a", "usr_b"]);
        store
    }

    #[tokio::test]
    async fn participant_can_create_message() {
        let store = store_with_conversation();
        let msg = store
            .create_message("conv_1", &identity("usr_a"), "hello")
            .await
            .unwrap();

        assert!(msg.id.starts_with("msg_"));
        assert_eq!(msg.conversation_id, "conv_1");
        assert_eq!(msg.sender_id, "usr_a");
        assert_eq!(msg.kind, "text");
        assert_eq!(msg.content, "hello");
        assert_eq!(store.message_count("conv_1"), 1);
    }

    #[tokio::test]
    async fn non_participant_is_rejected() {
        let store = store_with_conversation();
        let err = store
            .create_message("conv_1", &identity("usr_intruder"), "hello")
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotParticipant);
        assert_eq!(store.message_count("conv_1"), 0);
    }

    #[tokio::test]
    async fn unknown_conversation_is_rejected() {
        let store = store_with_conversation();
        let err = store
            .create_message("conv_missing", &identity("usr_a"), "hello")
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotParticipant);
    }

    #[tokio::test]
    async fn empty_content_fails_validation() {
        let store = store_with_conversation();
        let err = store
            .create_message("conv_1", &identity("usr_a"), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.message_count("conv_1"), 0);
    }

    #[tokio::test]
    async fn over_long_content_fails_validation() {
        let store = store_with_conversation();
        let err = store
            .create_message("conv_1", &identity("usr_a"), &"x".repeat(MAX_CONTENT_LEN + 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn content_is_trimmed() {
        let store = store_with_conversation();
        let msg = store
            .create_message("conv_1", &identity("usr_b"), "  hi there\n")
            .await
            .unwrap();
        assert_eq!(msg.content, "hi there");
    }
}
