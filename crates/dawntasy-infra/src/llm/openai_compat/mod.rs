//! OpenAI-compatible completion source.
//!
//! Posts to `{base_url}/chat/completions` with bearer authentication. One
//! implementation serves OpenAI itself and any server speaking the same
//! protocol (local gateways, proxies) through the configurable base URL.
//!
//! Streaming hands back the raw response body; SSE framing is parsed by the
//! core stream assembler.

mod types;

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::RETRY_AFTER;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use dawntasy_core::llm::source::{ByteStream, CompletionSource};
use dawntasy_types::config::ProviderConfig;
use dawntasy_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use self::types::ChatCompletionResponse;

/// Completion source for any OpenAI-compatible API.
///
/// # API Key Security
///
/// The API key is stored as a [`SecretString`] and only exposed when the
/// `Authorization` header is built. The type does not implement `Debug`.
pub struct OpenAiCompatSource {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    provider_name: String,
    timeout: Duration,
}

impl OpenAiCompatSource {
    /// `timeout_secs` bounds connecting and each read. A non-streaming call
    /// is additionally bounded end to end; a streamed reply may run longer
    /// as long as bytes keep arriving.
    pub fn new(config: &ProviderConfig, api_key: SecretString) -> Result<Self, LlmError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            provider_name: config.name.clone(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn post(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::RequestBuilder, LlmError> {
        if request.messages.is_empty() {
            return Err(LlmError::InvalidRequest("no messages to send".into()));
        }

        let mut body = request.clone();
        body.stream = stream;

        let builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body);
        Ok(if stream { builder } else { builder.timeout(self.timeout) })
    }
}

/// Map a non-2xx response to an [`LlmError`], passing success through.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_ms = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let error_body = response.text().await.unwrap_or_default();

    Err(match status.as_u16() {
        401 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited { retry_after_ms },
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {error_body}"),
        },
    })
}

fn transport_error(e: reqwest::Error) -> LlmError {
    LlmError::Provider {
        message: format!("HTTP request failed: {e}"),
    }
}

impl CompletionSource for OpenAiCompatSource {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let response = self
            .post(request, false)?
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Deserialization("response contained no choices".into()))?;

        debug!(provider = %self.provider_name, model = ?parsed.model, "Completion received");
        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            model: parsed.model,
            usage: parsed.usage,
        })
    }

    fn stream(&self, request: CompletionRequest) -> ByteStream {
        let builder = match self.post(&request, true) {
            Ok(builder) => builder,
            Err(e) => return Box::pin(futures_util::stream::once(async move { Err(e) })),
        };

        Box::pin(async_stream::try_stream! {
            let response = builder.send().await.map_err(transport_error)?;
            let response = check_status(response).await?;

            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| LlmError::Stream(format!("connection interrupted: {e}")))?;
                yield chunk.to_vec();
            }
        })
    }
}

// OpenAiCompatSource intentionally does NOT implement Debug.
