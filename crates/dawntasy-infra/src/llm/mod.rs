//! Completion source implementations.
//!
//! Contains the concrete [`CompletionSource`] used in production, an HTTP
//! client for any OpenAI-compatible chat-completions endpoint, plus the
//! factory ([`create_source`]) that builds it from a [`ProviderConfig`].
//!
//! [`CompletionSource`]: dawntasy_core::llm::source::CompletionSource

pub mod openai_compat;

use secrecy::SecretString;

use dawntasy_types::config::ProviderConfig;
use dawntasy_types::llm::LlmError;

use self::openai_compat::OpenAiCompatSource;

/// Read the API key named by `config.api_key_env` from the environment.
pub fn resolve_api_key(config: &ProviderConfig) -> Option<SecretString> {
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .map(SecretString::from)
}

/// Create the completion source described by `config`.
///
/// # Errors
///
/// `AuthenticationFailed` if the API key variable is unset or empty.
pub fn create_source(config: &ProviderConfig) -> Result<OpenAiCompatSource, LlmError> {
    let api_key = resolve_api_key(config).ok_or_else(|| {
        tracing::warn!(
            provider = %config.name,
            api_key_env = %config.api_key_env,
            "No API key found in environment"
        );
        LlmError::AuthenticationFailed
    })?;
    OpenAiCompatSource::new(config, api_key)
}
