//! Session cache: the signed-in user's chats and the one that is open.
//!
//! `SessionCache` mediates every read and write against the chat store for
//! one `SessionContext`. Reads are pass-through. The open chat lives in a
//! shared slot that three things write to: optimistic local appends, the
//! assembled assistant reply, and the live synchronizer.
//!
//! `send_message` keeps a strict order: the user's message is persisted
//! before the completion request goes out, and the reply is persisted only
//! after it has been fully assembled. A failed completion therefore leaves
//! the question on record without an answer, which is a valid state.

use std::slice;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dawntasy_types::chat::{Chat, ChatMessage, MessageRole};
use dawntasy_types::config::ChatConfig;
use dawntasy_types::error::ChatError;
use dawntasy_types::llm::{CompletionRequest, LlmError, Message};

use super::store::ChatStore;
use super::sync::{SessionSynchronizer, SharedChat};
use super::title::derive_title;
use crate::llm::assembler::assemble_stream;
use crate::llm::source::CompletionSource;
use crate::session::SessionContext;

/// Chat state for one signed-in session.
///
/// Generic over `ChatStore` and `CompletionSource` to maintain clean
/// architecture (dawntasy-core never depends on dawntasy-infra).
pub struct SessionCache<S: ChatStore, C: CompletionSource> {
    context: SessionContext,
    store: S,
    source: C,
    config: ChatConfig,
    current: SharedChat,
    sync: Option<SessionSynchronizer>,
}

impl<S: ChatStore, C: CompletionSource> SessionCache<S, C> {
    pub fn new(context: SessionContext, store: S, source: C, config: ChatConfig) -> Self {
        Self {
            context,
            store,
            source,
            config,
            current: Arc::new(RwLock::new(None)),
            sync: None,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    // --- Chat listing and lifecycle ---

    /// All chats of the signed-in user, most recently updated first.
    #[tracing::instrument(name = "list_chats", skip(self), fields(owner_id = %self.context.owner_id()))]
    pub async fn list_chats(&self) -> Result<Vec<Chat>, ChatError> {
        let mut chats = self
            .store
            .list_chats(self.context.owner_id())
            .await
            .map_err(ChatError::Fetch)?;
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        debug!(count = chats.len(), "Chats listed");
        Ok(chats)
    }

    /// Open a chat and keep it in sync until another chat is opened or the
    /// session closes.
    ///
    /// A failed lookup leaves the previously open chat untouched.
    #[tracing::instrument(name = "open_chat", skip(self), fields(owner_id = %self.context.owner_id()))]
    pub async fn open_chat(&mut self, chat_id: Uuid) -> Result<Chat, ChatError> {
        let owner_id = self.context.owner_id().to_string();

        let chat = self
            .store
            .get_chat(&chat_id, &owner_id)
            .await
            .map_err(|e| ChatError::from_fetch(chat_id, e))?;

        if let Some(previous) = self.sync.take() {
            previous.stop().await;
        }

        *self.current.write().await = Some(chat.clone());

        match SessionSynchronizer::start(&self.store, chat_id, &owner_id, self.current.clone()).await {
            Ok(sync) => self.sync = Some(sync),
            Err(e) => {
                *self.current.write().await = None;
                return Err(ChatError::from_fetch(chat_id, e));
            }
        }

        info!(chat_id = %chat_id, messages = chat.messages.len(), "Chat opened");
        Ok(chat)
    }

    /// Create an empty chat with the default title. The open chat is unchanged.
    #[tracing::instrument(name = "create_chat", skip(self), fields(owner_id = %self.context.owner_id()))]
    pub async fn create_chat(&self) -> Result<Uuid, ChatError> {
        let chat = Chat::new(self.context.owner_id(), self.config.default_title.clone());
        self.store
            .create_chat(&chat)
            .await
            .map_err(ChatError::Persistence)?;

        info!(chat_id = %chat.id, "Chat created");
        Ok(chat.id)
    }

    /// Snapshot of the open chat, including in-flight local messages.
    pub async fn current_chat(&self) -> Option<Chat> {
        self.current.read().await.clone()
    }

    pub fn current_chat_id(&self) -> Option<Uuid> {
        self.sync.as_ref().map(|s| s.chat_id())
    }

    /// Whether the open chat's live subscription is running.
    pub fn is_syncing(&self) -> bool {
        self.sync.as_ref().is_some_and(|s| s.is_active())
    }

    /// Release the live subscription and forget the open chat.
    pub async fn close(&mut self) {
        if let Some(sync) = self.sync.take() {
            sync.stop().await;
        }
        *self.current.write().await = None;
        info!(owner_id = %self.context.owner_id(), "Session closed");
    }

    // --- Sending ---

    /// Send a user message in the open chat and return the assistant reply.
    ///
    /// `on_delta` receives each reply fragment as it arrives.
    ///
    /// # Errors
    ///
    /// - `Persistence` before any completion call if the user message could
    ///   not be stored; nothing is left behind.
    /// - `Stream` if the completion failed; the user message stays stored.
    /// - `Persistence` if the reply could not be stored; the user message
    ///   stays stored.
    #[tracing::instrument(
        name = "send_message",
        skip(self, content, on_delta),
        fields(owner_id = %self.context.owner_id(), chat_id = tracing::field::Empty)
    )]
    pub async fn send_message<F>(&self, content: &str, on_delta: F) -> Result<ChatMessage, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let chat = self.current_chat().await.ok_or(ChatError::NoCurrentChat)?;
        tracing::Span::current().record("chat_id", tracing::field::display(chat.id));
        let owner_id = self.context.owner_id();

        let user_message = ChatMessage::user(content);
        self.append_local(&chat.id, &user_message).await;
        if let Err(e) = self
            .store
            .append_messages(&chat.id, owner_id, slice::from_ref(&user_message), user_message.timestamp)
            .await
        {
            self.retract_local(&chat.id, &user_message.id).await;
            return Err(ChatError::Persistence(e));
        }
        debug!(message_id = %user_message.id, "User message persisted");

        let mut history = chat.clone();
        history.union_messages(slice::from_ref(&user_message));
        let request = self.build_request(&history);

        let reply = match self.request_reply(request, on_delta).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Completion failed, question kept without a reply");
                return Err(ChatError::Stream(e));
            }
        };

        self.append_local(&chat.id, &reply).await;
        if let Err(e) = self
            .store
            .append_messages(&chat.id, owner_id, slice::from_ref(&reply), reply.timestamp)
            .await
        {
            self.retract_local(&chat.id, &reply.id).await;
            return Err(ChatError::Persistence(e));
        }

        if !chat.has_assistant_reply() && chat.title == self.config.default_title {
            let first = chat.first_user_message().unwrap_or(&user_message);
            self.update_title(&chat.id, &first.content).await;
        }

        info!(message_id = %reply.id, chars = reply.content.len(), "Reply persisted");
        Ok(reply)
    }

    fn build_request(&self, chat: &Chat) -> CompletionRequest {
        let mut messages = Vec::with_capacity(chat.messages.len() + 1);
        if let Some(system) = self
            .config
            .system_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            messages.push(Message {
                role: MessageRole::System,
                content: system.to_string(),
            });
        }
        messages.extend(chat.history());

        CompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: self.config.stream,
        }
    }

    async fn request_reply<F>(&self, request: CompletionRequest, mut on_delta: F) -> Result<ChatMessage, LlmError>
    where
        F: FnMut(&str) + Send,
    {
        if request.stream {
            return assemble_stream(self.source.stream(request), on_delta).await;
        }

        let response = self.source.complete(&request).await?;
        if !response.content.is_empty() {
            on_delta(&response.content);
        }
        Ok(ChatMessage::assistant(response.content))
    }

    /// Persist a title derived from the chat's first user message.
    ///
    /// Failure is logged only: the exchange itself already succeeded.
    async fn update_title(&self, chat_id: &Uuid, first_message: &str) {
        let Some(title) = derive_title(first_message, self.config.title_max_chars) else {
            return;
        };

        match self.store.set_title(chat_id, self.context.owner_id(), &title).await {
            Ok(()) => {
                if let Some(chat) = self.current.write().await.as_mut().filter(|c| &c.id == chat_id) {
                    chat.title = title.clone();
                }
                info!(chat_id = %chat_id, title = %title, "Chat titled");
            }
            Err(e) => warn!(chat_id = %chat_id, error = %e, "Failed to persist chat title"),
        }
    }

    async fn append_local(&self, chat_id: &Uuid, message: &ChatMessage) {
        if let Some(chat) = self.current.write().await.as_mut().filter(|c| &c.id == chat_id) {
            chat.union_messages(slice::from_ref(message));
        }
    }

    async fn retract_local(&self, chat_id: &Uuid, message_id: &Uuid) {
        if let Some(chat) = self.current.write().await.as_mut().filter(|c| &c.id == chat_id) {
            chat.retract(message_id);
        }
    }
}
