//! ChatStore trait definition.
//!
//! The remote chat store holds one record per chat, keyed by chat id and
//! scoped by owner id. Follows the same RPITIT pattern as `CompletionSource`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::Stream;
use uuid::Uuid;

use dawntasy_types::chat::{Chat, ChatMessage};
use dawntasy_types::error::RepositoryError;

/// Live snapshots of one chat. The first item is the state at subscribe time.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Chat, RepositoryError>> + Send + 'static>>;

/// Repository trait for chat persistence.
///
/// Implementations live in dawntasy-infra (e.g., `SqliteChatStore`).
///
/// Every operation addressed by chat id takes the caller's owner id and must
/// check it itself: a chat owned by someone else yields
/// `RepositoryError::AccessDenied`, never the chat.
pub trait ChatStore: Send + Sync {
    /// List an owner's chats, ordered by `updated_at` DESC.
    fn list_chats(
        &self,
        owner_id: &str,
    ) -> impl Future<Output = Result<Vec<Chat>, RepositoryError>> + Send;

    /// Get one chat with its messages.
    fn get_chat(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
    ) -> impl Future<Output = Result<Chat, RepositoryError>> + Send;

    /// Persist a new chat.
    fn create_chat(&self, chat: &Chat) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Union-append messages to a chat.
    ///
    /// Messages whose id is already stored are skipped, so concurrent writers
    /// never overwrite each other. `updated_at` becomes
    /// `max(updated_at, updated_at_arg)`.
    fn append_messages(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
        messages: &[ChatMessage],
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Replace the chat title.
    fn set_title(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
        title: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Subscribe to live snapshots of a chat.
    ///
    /// The listener is released when the returned stream is dropped.
    fn subscribe(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
    ) -> impl Future<Output = Result<SnapshotStream, RepositoryError>> + Send;
}

impl<T: ChatStore> ChatStore for Arc<T> {
    fn list_chats(
        &self,
        owner_id: &str,
    ) -> impl Future<Output = Result<Vec<Chat>, RepositoryError>> + Send {
        (**self).list_chats(owner_id)
    }

    fn get_chat(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
    ) -> impl Future<Output = Result<Chat, RepositoryError>> + Send {
        (**self).get_chat(chat_id, owner_id)
    }

    fn create_chat(&self, chat: &Chat) -> impl Future<Output = Result<(), RepositoryError>> + Send {
        (**self).create_chat(chat)
    }

    fn append_messages(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
        messages: &[ChatMessage],
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send {
        (**self).append_messages(chat_id, owner_id, messages, updated_at)
    }

    fn set_title(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
        title: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send {
        (**self).set_title(chat_id, owner_id, title)
    }

    fn subscribe(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
    ) -> impl Future<Output = Result<SnapshotStream, RepositoryError>> + Send {
        (**self).subscribe(chat_id, owner_id)
    }
}
