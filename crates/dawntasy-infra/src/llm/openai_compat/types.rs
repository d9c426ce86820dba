//! Wire types for the non-streaming chat-completions response.
//!
//! The request body is [`dawntasy_types::llm::CompletionRequest`] as-is and
//! streaming frames are parsed by the core assembler, so only the response
//! envelope lives here.

use serde::Deserialize;

use dawntasy_types::llm::Usage;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionChoice {
    pub message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}
