//! In-crate test doubles for the chat ports.
//!
//! `MemoryStore` is a minimal `ChatStore` with failure switches, listener
//! accounting and a shared call log; `ScriptedSource` replays a fixed reply.
//! Both write to the same log so tests can assert call order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures_util::stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use dawntasy_types::chat::{Chat, ChatMessage};
use dawntasy_types::error::RepositoryError;
use dawntasy_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use super::store::{ChatStore, SnapshotStream};
use crate::llm::source::{ByteStream, CompletionSource};

pub type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

type Listeners = Arc<Mutex<HashMap<Uuid, usize>>>;

struct ListenerGuard {
    chat_id: Uuid,
    listeners: Listeners,
}

impl ListenerGuard {
    fn new(chat_id: Uuid, listeners: Listeners) -> Self {
        *listeners.lock().unwrap().entry(chat_id).or_insert(0) += 1;
        Self { chat_id, listeners }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let mut listeners = self.listeners.lock().unwrap();
        if let Some(count) = listeners.get_mut(&self.chat_id) {
            *count -= 1;
            if *count == 0 {
                listeners.remove(&self.chat_id);
            }
        }
    }
}

pub struct MemoryStore {
    chats: Mutex<HashMap<Uuid, Chat>>,
    updates: broadcast::Sender<Chat>,
    listeners: Listeners,
    log: CallLog,
    fail_reads: AtomicBool,
    fail_appends: AtomicBool,
    appends: AtomicUsize,
    fail_append_at: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            chats: Mutex::new(HashMap::new()),
            updates,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            log: CallLog::default(),
            fail_reads: AtomicBool::new(false),
            fail_appends: AtomicBool::new(false),
            appends: AtomicUsize::new(0),
            fail_append_at: AtomicUsize::new(0),
        }
    }
}

impl MemoryStore {
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn listener_count(&self, chat_id: &Uuid) -> usize {
        self.listeners.lock().unwrap().get(chat_id).copied().unwrap_or(0)
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.lock().unwrap().values().sum()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Reject only the `n`th `append_messages` call (1-based) from now on.
    pub fn fail_append_number(&self, n: usize) {
        let seen = self.appends.load(Ordering::SeqCst);
        self.fail_append_at.store(seen + n, Ordering::SeqCst);
    }

    /// Stored state of a chat, bypassing ownership checks.
    pub fn stored(&self, chat_id: &Uuid) -> Option<Chat> {
        self.chats.lock().unwrap().get(chat_id).cloned()
    }

    fn lookup(&self, chat_id: &Uuid, owner_id: &str) -> Result<Chat, RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        let chats = self.chats.lock().unwrap();
        let chat = chats.get(chat_id).ok_or(RepositoryError::NotFound)?;
        if chat.owner_id != owner_id {
            return Err(RepositoryError::AccessDenied);
        }
        Ok(chat.clone())
    }

    fn mutate(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
        apply: impl FnOnce(&mut Chat),
    ) -> Result<(), RepositoryError> {
        let snapshot = {
            let mut chats = self.chats.lock().unwrap();
            let chat = chats.get_mut(chat_id).ok_or(RepositoryError::NotFound)?;
            if chat.owner_id != owner_id {
                return Err(RepositoryError::AccessDenied);
            }
            apply(chat);
            chat.clone()
        };
        let _ = self.updates.send(snapshot);
        Ok(())
    }
}

impl ChatStore for MemoryStore {
    async fn list_chats(&self, owner_id: &str) -> Result<Vec<Chat>, RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        let mut chats: Vec<Chat> = self
            .chats
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    async fn get_chat(&self, chat_id: &Uuid, owner_id: &str) -> Result<Chat, RepositoryError> {
        self.lookup(chat_id, owner_id)
    }

    async fn create_chat(&self, chat: &Chat) -> Result<(), RepositoryError> {
        record(&self.log, "create");
        self.chats.lock().unwrap().insert(chat.id, chat.clone());
        Ok(())
    }

    async fn append_messages(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
        messages: &[ChatMessage],
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        for message in messages {
            record(&self.log, format!("append:{}", message.role));
        }
        let call = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_appends.load(Ordering::SeqCst) || call == self.fail_append_at.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("write rejected".into()));
        }
        self.mutate(chat_id, owner_id, |chat| {
            chat.union_messages(messages);
            chat.touch(updated_at);
        })
    }

    async fn set_title(&self, chat_id: &Uuid, owner_id: &str, title: &str) -> Result<(), RepositoryError> {
        record(&self.log, "set_title");
        self.mutate(chat_id, owner_id, |chat| chat.title = title.to_string())
    }

    async fn subscribe(&self, chat_id: &Uuid, owner_id: &str) -> Result<SnapshotStream, RepositoryError> {
        let mut rx = self.updates.subscribe();
        let initial = self.lookup(chat_id, owner_id)?;
        let guard = ListenerGuard::new(*chat_id, self.listeners.clone());
        let id = *chat_id;

        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            yield Ok(initial);
            loop {
                match rx.recv().await {
                    Ok(chat) if chat.id == id => yield Ok(chat),
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}

/// Completion source that replays a fixed reply, or fails.
///
/// With both parts and a failure, streaming delivers the parts and then
/// breaks off with the failure instead of `[DONE]`.
pub struct ScriptedSource {
    parts: Vec<String>,
    failure: Option<String>,
    log: CallLog,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedSource {
    pub fn replying(parts: &[&str], log: CallLog) -> Self {
        Self {
            parts: parts.iter().map(|p| p.to_string()).collect(),
            failure: None,
            log,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str, log: CallLog) -> Self {
        Self {
            parts: Vec::new(),
            failure: Some(message.to_string()),
            log,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn interrupted(parts: &[&str], message: &str, log: CallLog) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::replying(parts, log)
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn frames(&self) -> Vec<u8> {
        let mut body = String::new();
        for part in &self.parts {
            let frame = serde_json::json!({ "choices": [{ "delta": { "content": part } }] });
            body.push_str(&format!("data: {frame}\n\n"));
        }
        body.into_bytes()
    }
}

impl CompletionSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        record(&self.log, "complete");
        self.requests.lock().unwrap().push(request.clone());
        match &self.failure {
            Some(message) => Err(LlmError::Provider {
                message: message.clone(),
            }),
            None => Ok(CompletionResponse {
                content: self.parts.concat(),
                model: Some(request.model.clone()),
                usage: None,
            }),
        }
    }

    fn stream(&self, request: CompletionRequest) -> ByteStream {
        record(&self.log, "stream");
        self.requests.lock().unwrap().push(request);
        let mut items = Vec::new();
        if !self.parts.is_empty() {
            items.push(Ok(self.frames()));
        }
        items.push(match &self.failure {
            Some(message) => Err(LlmError::Stream(message.clone())),
            None => Ok(b"data: [DONE]\n\n".to_vec()),
        });
        Box::pin(stream::iter(items))
    }
}
