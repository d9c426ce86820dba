//! Chat and chat message types for Dawntasy.
//!
//! A `Chat` is one persisted conversation between a user and the assistant.
//! Its message list is append-only from the client's point of view: messages
//! are identified by a client-assigned id, which is what makes union-append
//! and snapshot merging idempotent.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export MessageRole from llm module (it's used in both chat and llm contexts).
pub use crate::llm::MessageRole;
use crate::llm::Message;

/// Title given to a chat before its first exchange completes.
pub const DEFAULT_CHAT_TITLE: &str = "New Conversation";

/// Current time truncated to microseconds, the precision stores keep.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A single message within a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message with a fresh id and the current time.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: content.into(),
            timestamp: now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

impl From<&ChatMessage> for Message {
    fn from(message: &ChatMessage) -> Self {
        Message {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// A persisted conversation owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Chat {
    /// Create an empty chat for `owner_id`.
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        let created_at = now();
        Self {
            id: Uuid::now_v7(),
            title: title.into(),
            created_at,
            updated_at: created_at,
            owner_id: owner_id.into(),
            messages: Vec::new(),
        }
    }

    pub fn contains_message(&self, message_id: &Uuid) -> bool {
        self.messages.iter().any(|m| &m.id == message_id)
    }

    /// Advance `updated_at` to `at`. Never moves it backwards.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.updated_at {
            self.updated_at = at;
        }
    }

    /// Append every message whose id is not already present, in order.
    ///
    /// Returns how many messages were added. `updated_at` is advanced to the
    /// newest added timestamp.
    pub fn union_messages(&mut self, incoming: &[ChatMessage]) -> usize {
        let mut added = 0;
        for message in incoming {
            if self.contains_message(&message.id) {
                continue;
            }
            self.touch(message.timestamp);
            self.messages.push(message.clone());
            added += 1;
        }
        added
    }

    /// Remove a message that was appended locally but never persisted.
    pub fn retract(&mut self, message_id: &Uuid) -> Option<ChatMessage> {
        let index = self.messages.iter().position(|m| &m.id == message_id)?;
        Some(self.messages.remove(index))
    }

    /// Merge a remote snapshot of this chat into the local view.
    ///
    /// The remote snapshot is the base. Local messages it does not contain
    /// yet (in-flight optimistic appends) are kept, after the remote ones and
    /// in their local order.
    pub fn merge_snapshot(&self, remote: Chat) -> Chat {
        let mut merged = remote;
        let pending: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|m| !merged.contains_message(&m.id))
            .cloned()
            .collect();
        merged.union_messages(&pending);
        merged.touch(self.updated_at);
        merged
    }

    pub fn first_user_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.role == MessageRole::User)
    }

    pub fn has_assistant_reply(&self) -> bool {
        self.messages.iter().any(|m| m.role == MessageRole::Assistant)
    }

    /// The conversation as role-tagged completion messages.
    pub fn history(&self) -> Vec<Message> {
        self.messages.iter().map(Message::from).collect()
    }
}
