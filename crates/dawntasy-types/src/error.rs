use thiserror::Error;
use uuid::Uuid;

use crate::llm::LlmError;

/// Errors from chat store operations (used by the `ChatStore` port in dawntasy-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("access denied")]
    AccessDenied,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by the session cache to its caller.
///
/// Store failures are split by direction: `Fetch` for reads, `Persistence`
/// for writes. The original cause is kept as the error source.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("failed to fetch chats")]
    Fetch(#[source] RepositoryError),

    #[error("failed to persist chat")]
    Persistence(#[source] RepositoryError),

    #[error("chat {0} not found")]
    NotFound(Uuid),

    #[error("access to chat {0} denied")]
    AccessDenied(Uuid),

    #[error("completion failed")]
    Stream(#[from] LlmError),

    #[error("no chat is open")]
    NoCurrentChat,

    #[error("message is empty")]
    EmptyMessage,
}

impl ChatError {
    /// Map a store read failure for `chat_id`, keeping not-found and
    /// ownership failures distinct from transport failures.
    pub fn from_fetch(chat_id: Uuid, err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ChatError::NotFound(chat_id),
            RepositoryError::AccessDenied => ChatError::AccessDenied(chat_id),
            other => ChatError::Fetch(other),
        }
    }
}
