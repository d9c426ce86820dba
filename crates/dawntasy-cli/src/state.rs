//! Application state wiring the store, configuration and sessions together.
//!
//! `SessionCache` is generic over its store and completion source; the CLI
//! pins it to the SQLite store and the OpenAI-compatible HTTP source.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use dawntasy_core::chat::cache::SessionCache;
use dawntasy_core::session::SessionContext;
use dawntasy_infra::config::load_config;
use dawntasy_infra::filesystem::{database_path, ensure_data_dir, resolve_data_dir};
use dawntasy_infra::llm::create_source;
use dawntasy_infra::llm::openai_compat::OpenAiCompatSource;
use dawntasy_infra::sqlite::{DatabasePool, SqliteChatStore};
use dawntasy_types::config::AppConfig;
use dawntasy_types::identity::UserIdentity;

/// Session cache pinned to the concrete infra implementations.
pub type ConcreteSession = SessionCache<Arc<SqliteChatStore>, OpenAiCompatSource>;

pub struct AppState {
    pub data_dir: PathBuf,
    pub config: AppConfig,
    pub db_pool: DatabasePool,
    pub store: Arc<SqliteChatStore>,
}

impl AppState {
    /// Resolve the data directory, load `config.toml` and open the database.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        ensure_data_dir(&data_dir).await?;

        let config = load_config(&data_dir).await;

        let db_path = database_path(&data_dir);
        let db_pool = DatabasePool::open(&db_path)
            .await
            .with_context(|| format!("failed to open database {}", db_path.display()))?;
        let store = Arc::new(SqliteChatStore::new(db_pool.clone()));

        tracing::debug!(data_dir = %data_dir.display(), "Application state initialized");
        Ok(Self {
            data_dir,
            config,
            db_pool,
            store,
        })
    }

    /// Start a session for `user` that can send messages.
    ///
    /// Fails when the completion source has no API key.
    pub fn session(&self, user: &str) -> anyhow::Result<ConcreteSession> {
        let source = create_source(&self.config.provider).with_context(|| {
            format!(
                "no API key for provider '{}'; set {}",
                self.config.provider.name, self.config.provider.api_key_env
            )
        })?;

        Ok(SessionCache::new(
            SessionContext::new(UserIdentity::new(user)),
            self.store.clone(),
            source,
            self.config.chat.clone(),
        ))
    }

    pub async fn shutdown(&self) {
        self.db_pool.close().await;
    }
}
