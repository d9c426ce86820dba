//! Live synchronization of the open chat.
//!
//! A `SessionSynchronizer` owns the single store subscription for the chat
//! that is currently open. A background task applies each remote snapshot to
//! the shared current-chat slot until the synchronizer is stopped or dropped.
//!
//! Snapshots are merged, not swapped in: the remote snapshot is the base and
//! local messages it does not know about yet (an optimistic append still in
//! flight) are kept on top. See [`Chat::merge_snapshot`].

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dawntasy_types::chat::Chat;
use dawntasy_types::error::RepositoryError;

use super::store::{ChatStore, SnapshotStream};

/// The current-chat slot shared between the cache and its synchronizer.
pub type SharedChat = Arc<RwLock<Option<Chat>>>;

/// Handle to the live subscription of one open chat.
///
/// Dropping the handle cancels the task, which releases the store listener.
/// Use [`SessionSynchronizer::stop`] to also wait for the release.
pub struct SessionSynchronizer {
    chat_id: Uuid,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SessionSynchronizer {
    /// Subscribe to `chat_id` and start applying snapshots to `target`.
    #[tracing::instrument(name = "sync_start", skip(store, target), fields(chat_id = %chat_id))]
    pub async fn start<S: ChatStore>(
        store: &S,
        chat_id: Uuid,
        owner_id: &str,
        target: SharedChat,
    ) -> Result<Self, RepositoryError> {
        let snapshots = store.subscribe(&chat_id, owner_id).await?;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(chat_id, snapshots, target, cancel.clone()));

        info!(chat_id = %chat_id, "Live sync started");
        Ok(Self {
            chat_id,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn chat_id(&self) -> Uuid {
        self.chat_id
    }

    /// Whether the background task is still running.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the subscription and wait until the task has released it.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(chat_id = %self.chat_id, error = %e, "Live sync task failed");
            }
        }
        info!(chat_id = %self.chat_id, "Live sync stopped");
    }
}

impl Drop for SessionSynchronizer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for SessionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSynchronizer")
            .field("chat_id", &self.chat_id)
            .field("active", &self.is_active())
            .finish()
    }
}

async fn run(chat_id: Uuid, mut snapshots: SnapshotStream, target: SharedChat, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = snapshots.next() => match next {
                Some(Ok(remote)) => apply_snapshot(&target, remote).await,
                Some(Err(e)) => warn!(chat_id = %chat_id, error = %e, "Snapshot delivery failed"),
                None => {
                    debug!(chat_id = %chat_id, "Snapshot stream ended");
                    break;
                }
            },
        }
    }
}

/// Merge `remote` into the slot if it still holds the same chat.
async fn apply_snapshot(target: &SharedChat, remote: Chat) {
    let mut slot = target.write().await;
    match slot.as_ref() {
        Some(local) if local.id == remote.id => {
            debug!(chat_id = %remote.id, messages = remote.messages.len(), "Applying remote snapshot");
            let merged = local.merge_snapshot(remote);
            *slot = Some(merged);
        }
        _ => debug!(chat_id = %remote.id, "Dropping snapshot for a chat that is no longer open"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::MemoryStore;
    use dawntasy_types::chat::{ChatMessage, DEFAULT_CHAT_TITLE};
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    async fn seeded(store: &MemoryStore, owner: &str) -> Chat {
        let chat = Chat::new(owner, DEFAULT_CHAT_TITLE);
        store.create_chat(&chat).await.unwrap();
        chat
    }

    #[tokio::test]
    async fn remote_writes_reach_the_slot() {
        let store = MemoryStore::default();
        let chat = seeded(&store, "u1").await;
        let slot: SharedChat = Arc::new(RwLock::new(Some(chat.clone())));

        let sync = SessionSynchronizer::start(&store, chat.id, "u1", slot.clone())
            .await
            .unwrap();
        assert!(sync.is_active());

        let from_other_device = ChatMessage::user("sent from my phone");
        store
            .append_messages(&chat.id, "u1", &[from_other_device.clone()], from_other_device.timestamp)
            .await
            .unwrap();
        settle().await;

        let local = slot.read().await.clone().unwrap();
        assert_eq!(local.messages, vec![from_other_device]);
        sync.stop().await;
    }

    #[tokio::test]
    async fn stop_releases_the_listener() {
        let store = MemoryStore::default();
        let chat = seeded(&store, "u1").await;
        let slot: SharedChat = Arc::new(RwLock::new(Some(chat.clone())));

        let sync = SessionSynchronizer::start(&store, chat.id, "u1", slot).await.unwrap();
        assert_eq!(store.listener_count(&chat.id), 1);

        sync.stop().await;
        assert_eq!(store.listener_count(&chat.id), 0);
    }

    #[tokio::test]
    async fn drop_releases_the_listener() {
        let store = MemoryStore::default();
        let chat = seeded(&store, "u1").await;
        let slot: SharedChat = Arc::new(RwLock::new(Some(chat.clone())));

        {
            let _sync = SessionSynchronizer::start(&store, chat.id, "u1", slot).await.unwrap();
            assert_eq!(store.listener_count(&chat.id), 1);
        }
        settle().await;
        assert_eq!(store.listener_count(&chat.id), 0);
    }

    #[tokio::test]
    async fn snapshots_for_another_chat_are_dropped() {
        let store = MemoryStore::default();
        let watched = seeded(&store, "u1").await;
        let displayed = seeded(&store, "u1").await;
        let slot: SharedChat = Arc::new(RwLock::new(Some(displayed.clone())));

        let sync = SessionSynchronizer::start(&store, watched.id, "u1", slot.clone())
            .await
            .unwrap();
        let message = ChatMessage::user("wrong chat");
        store
            .append_messages(&watched.id, "u1", &[message.clone()], message.timestamp)
            .await
            .unwrap();
        settle().await;

        assert_eq!(slot.read().await.clone().unwrap(), displayed);
        sync.stop().await;
    }

    #[tokio::test]
    async fn foreign_owner_cannot_subscribe() {
        let store = MemoryStore::default();
        let chat = seeded(&store, "u1").await;
        let slot: SharedChat = Arc::new(RwLock::new(None));

        let result = SessionSynchronizer::start(&store, chat.id, "intruder", slot).await;
        assert!(matches!(result, Err(RepositoryError::AccessDenied)));
        assert_eq!(store.listener_count(&chat.id), 0);
    }
}
