//! In-memory chat store.
//!
//! A `DashMap` keyed by chat id. Appends take the entry lock, so a union
//! append is atomic with respect to every other writer of the same chat.
//! Useful for tests and for running the CLI without a database.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use uuid::Uuid;

use dawntasy_core::chat::store::{ChatStore, SnapshotStream};
use dawntasy_types::chat::{Chat, ChatMessage};
use dawntasy_types::error::RepositoryError;

use super::notify::SnapshotHub;

#[derive(Default)]
pub struct InMemoryChatStore {
    chats: DashMap<Uuid, Chat>,
    hub: SnapshotHub,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hub(&self) -> &SnapshotHub {
        &self.hub
    }

    pub fn listener_count(&self, chat_id: &Uuid) -> usize {
        self.hub.listener_count(chat_id)
    }

    fn lookup(&self, chat_id: &Uuid, owner_id: &str) -> Result<Chat, RepositoryError> {
        let chat = self.chats.get(chat_id).ok_or(RepositoryError::NotFound)?;
        if chat.owner_id != owner_id {
            return Err(RepositoryError::AccessDenied);
        }
        Ok(chat.clone())
    }

    /// Apply `change` and publish the result, both under the entry lock so
    /// subscribers see snapshots in write order.
    fn update(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
        change: impl FnOnce(&mut Chat),
    ) -> Result<(), RepositoryError> {
        let mut chat = self.chats.get_mut(chat_id).ok_or(RepositoryError::NotFound)?;
        if chat.owner_id != owner_id {
            return Err(RepositoryError::AccessDenied);
        }
        change(&mut chat);
        self.hub.publish(chat.clone());
        Ok(())
    }
}

impl ChatStore for InMemoryChatStore {
    async fn list_chats(&self, owner_id: &str) -> Result<Vec<Chat>, RepositoryError> {
        let mut chats: Vec<Chat> = self
            .chats
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    async fn get_chat(&self, chat_id: &Uuid, owner_id: &str) -> Result<Chat, RepositoryError> {
        self.lookup(chat_id, owner_id)
    }

    async fn create_chat(&self, chat: &Chat) -> Result<(), RepositoryError> {
        match self.chats.entry(chat.id) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "chat {} already exists",
                chat.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(chat.clone());
                debug!(chat_id = %chat.id, "Chat stored");
                Ok(())
            }
        }
    }

    async fn append_messages(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
        messages: &[ChatMessage],
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.update(chat_id, owner_id, |chat| {
            let added = chat.union_messages(messages);
            chat.touch(updated_at);
            debug!(chat_id = %chat.id, added, "Messages appended");
        })
    }

    async fn set_title(&self, chat_id: &Uuid, owner_id: &str, title: &str) -> Result<(), RepositoryError> {
        self.update(chat_id, owner_id, |chat| chat.title = title.to_string())
    }

    async fn subscribe(&self, chat_id: &Uuid, owner_id: &str) -> Result<SnapshotStream, RepositoryError> {
        let listener = self.hub.listen(*chat_id);
        let initial = self.lookup(chat_id, owner_id)?;
        Ok(listener.into_stream(initial))
    }
}
