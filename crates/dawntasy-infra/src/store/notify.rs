//! Snapshot fan-out for live chat subscriptions.
//!
//! Stores publish the full state of a chat after every write. Each
//! subscriber filters the shared broadcast down to the chat it watches.
//! Listener counts are kept per chat so callers (and tests) can verify
//! that subscriptions are released.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{trace, warn};
use uuid::Uuid;

use dawntasy_core::chat::store::SnapshotStream;
use dawntasy_types::chat::Chat;

/// Default number of snapshots buffered per receiver before it lags.
const DEFAULT_CAPACITY: usize = 256;

type ListenerCounts = Arc<DashMap<Uuid, usize>>;

/// Broadcast hub for chat snapshots.
#[derive(Clone)]
pub struct SnapshotHub {
    sender: broadcast::Sender<Chat>,
    listeners: ListenerCounts,
}

impl SnapshotHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            listeners: Arc::new(DashMap::new()),
        }
    }

    /// Deliver a snapshot to every live subscriber of its chat.
    pub fn publish(&self, chat: Chat) {
        let chat_id = chat.id;
        // An error only means nobody is subscribed right now.
        let receivers = self.sender.send(chat).unwrap_or(0);
        trace!(chat_id = %chat_id, receivers, "Snapshot published");
    }

    /// Start listening for snapshots of `chat_id`.
    ///
    /// Call this before reading the initial state so that no write can fall
    /// between the read and the subscription.
    pub fn listen(&self, chat_id: Uuid) -> SnapshotListener {
        SnapshotListener {
            chat_id,
            rx: self.sender.subscribe(),
            _guard: ListenerGuard::register(chat_id, self.listeners.clone()),
        }
    }

    /// Number of live subscriptions on `chat_id`.
    pub fn listener_count(&self, chat_id: &Uuid) -> usize {
        self.listeners.get(chat_id).map(|c| *c).unwrap_or(0)
    }

    /// Number of live subscriptions across all chats.
    pub fn total_listeners(&self) -> usize {
        self.listeners.iter().map(|entry| *entry.value()).sum()
    }
}

impl Default for SnapshotHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A registered subscription that has not been turned into a stream yet.
pub struct SnapshotListener {
    chat_id: Uuid,
    rx: broadcast::Receiver<Chat>,
    _guard: ListenerGuard,
}

impl SnapshotListener {
    /// Stream `initial` followed by every later snapshot of the chat.
    ///
    /// The subscription is released when the stream is dropped.
    pub fn into_stream(self, initial: Chat) -> SnapshotStream {
        let SnapshotListener {
            chat_id,
            mut rx,
            _guard: guard,
        } = self;

        Box::pin(async_stream::stream! {
            let _guard = guard;
            yield Ok(initial);
            loop {
                match rx.recv().await {
                    Ok(chat) if chat.id == chat_id => yield Ok(chat),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        // Snapshots are full states; the next one catches up.
                        warn!(chat_id = %chat_id, skipped, "Snapshot receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

struct ListenerGuard {
    chat_id: Uuid,
    counts: ListenerCounts,
}

impl ListenerGuard {
    fn register(chat_id: Uuid, counts: ListenerCounts) -> Self {
        *counts.entry(chat_id).or_insert(0) += 1;
        Self { chat_id, counts }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.counts.remove_if_mut(&self.chat_id, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dawntasy_types::chat::DEFAULT_CHAT_TITLE;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_stream_starts_with_initial_state() {
        let hub = SnapshotHub::default();
        let chat = Chat::new("u1", DEFAULT_CHAT_TITLE);

        let mut stream = hub.listen(chat.id).into_stream(chat.clone());
        assert_eq!(stream.next().await.unwrap().unwrap(), chat);
    }

    #[tokio::test]
    async fn test_only_matching_chat_is_delivered() {
        let hub = SnapshotHub::default();
        let watched = Chat::new("u1", DEFAULT_CHAT_TITLE);
        let other = Chat::new("u1", DEFAULT_CHAT_TITLE);

        let mut stream = hub.listen(watched.id).into_stream(watched.clone());
        stream.next().await.unwrap().unwrap();

        hub.publish(other);
        let mut renamed = watched.clone();
        renamed.title = "Renamed".into();
        hub.publish(renamed.clone());

        assert_eq!(stream.next().await.unwrap().unwrap(), renamed);
    }

    #[test]
    fn test_listener_count_tracks_drops() {
        let hub = SnapshotHub::default();
        let chat = Chat::new("u1", DEFAULT_CHAT_TITLE);

        let first = hub.listen(chat.id);
        let second = hub.listen(chat.id).into_stream(chat.clone());
        assert_eq!(hub.listener_count(&chat.id), 2);
        assert_eq!(hub.total_listeners(), 2);

        drop(first);
        assert_eq!(hub.listener_count(&chat.id), 1);
        drop(second);
        assert_eq!(hub.listener_count(&chat.id), 0);
        assert_eq!(hub.total_listeners(), 0);
    }

    #[test]
    fn test_publish_without_listeners_is_a_no_op() {
        let hub = SnapshotHub::default();
        hub.publish(Chat::new("u1", DEFAULT_CHAT_TITLE));
        assert_eq!(hub.total_listeners(), 0);
    }
}
