//! Configuration types for Dawntasy.
//!
//! `AppConfig` represents the top-level `config.toml`: which completion
//! endpoint to talk to, and how chats are sent and titled. All fields have
//! defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::chat::DEFAULT_CHAT_TITLE;

/// Top-level configuration.
///
/// Loaded from `~/.dawntasy/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub chat: ChatConfig,
}

/// Connection settings for the OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Human-readable provider name (e.g., "openai").
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Transport timeout for one completion request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "openai".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// How messages are sent and chats are titled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: Option<f64>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,

    /// Request a server-sent token stream instead of a single response.
    #[serde(default = "default_stream")]
    pub stream: bool,

    /// Prepended to every completion request; never stored in a chat.
    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default = "default_title")]
    pub default_title: String,

    /// Character limit for titles derived from the first user message.
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> Option<f64> {
    Some(0.7)
}

fn default_max_tokens() -> Option<u32> {
    Some(1000)
}

fn default_stream() -> bool {
    true
}

fn default_title() -> String {
    DEFAULT_CHAT_TITLE.to_string()
}

fn default_title_max_chars() -> usize {
    30
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: default_stream(),
            system_prompt: None,
            default_title: default_title(),
            title_max_chars: default_title_max_chars(),
        }
    }
}
