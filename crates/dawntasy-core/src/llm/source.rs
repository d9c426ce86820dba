//! CompletionSource trait definition.
//!
//! Uses RPITIT for `complete`, and `Pin<Box<dyn Stream>>` for `stream`
//! (the byte stream must be `'static` so it can outlive the borrow of the
//! source while the reply is assembled).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;

use dawntasy_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Raw transport chunks of a streaming completion, in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, LlmError>> + Send + 'static>>;

/// Trait for chat-completion backends.
///
/// Implementations live in dawntasy-infra (e.g., `OpenAiCompatSource`).
/// A streaming call yields the response body unparsed; turning frames into
/// a message is the job of [`crate::llm::assembler`].
pub trait CompletionSource: Send + Sync {
    /// Human-readable source name (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request and return the body chunks.
    ///
    /// Connection and status errors surface as the first item of the stream.
    fn stream(&self, request: CompletionRequest) -> ByteStream;
}

impl<T: CompletionSource> CompletionSource for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send {
        (**self).complete(request)
    }

    fn stream(&self, request: CompletionRequest) -> ByteStream {
        (**self).stream(request)
    }
}
