//! Streamed completion assembly.
//!
//! A streaming completion arrives as newline-delimited server-sent-event
//! lines:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"The "}}]}
//! data: {"choices":[{"delta":{"content":"Rift "}}]}
//! data: [DONE]
//! ```
//!
//! Transport chunks do not respect line boundaries, so bytes are buffered
//! until a full line is available. Each content fragment is handed to the
//! caller as soon as its line completes, and accumulated into the final
//! assistant message.
//!
//! A frame that fails to parse is logged and skipped. Truncated frames at
//! chunk boundaries are normal and must not sink the whole reply.

use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use dawntasy_types::chat::ChatMessage;
use dawntasy_types::llm::{LlmError, StreamChunk};

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// Incremental state for one streamed reply.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    pending: Vec<u8>,
    content: String,
    done: bool,
    skipped_frames: usize,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk.
    ///
    /// Every complete line in the buffer is processed; fragments are passed
    /// to `on_delta` in order. Returns `true` once the `[DONE]` frame has
    /// been seen, after which further input is ignored.
    pub fn push<F>(&mut self, chunk: &[u8], on_delta: &mut F) -> bool
    where
        F: FnMut(&str),
    {
        if self.done {
            return true;
        }

        self.pending.extend_from_slice(chunk);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if self.process_line(&line[..line.len() - 1], on_delta) {
                self.done = true;
                self.pending.clear();
                return true;
            }
        }

        false
    }

    /// Finish assembly and build the assistant message.
    ///
    /// If the transport ended without `[DONE]`, a last unterminated line
    /// still in the buffer is processed first.
    pub fn finish<F>(mut self, on_delta: &mut F) -> ChatMessage
    where
        F: FnMut(&str),
    {
        if !self.done && !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.process_line(&line, on_delta);
        }

        debug!(
            chars = self.content.len(),
            skipped_frames = self.skipped_frames,
            saw_done = self.done,
            "Stream assembled"
        );
        ChatMessage::assistant(self.content)
    }

    /// Content accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of `data:` frames dropped because they were not valid JSON.
    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    /// Handle one line (without its `\n`). Returns `true` on `[DONE]`.
    fn process_line<F>(&mut self, raw: &[u8], on_delta: &mut F) -> bool
    where
        F: FnMut(&str),
    {
        let text = String::from_utf8_lossy(raw);
        let line = text.strip_suffix('\r').unwrap_or(&text);

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return false;
        };

        if payload.trim() == DONE_MARKER {
            return true;
        }

        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => {
                if let Some(fragment) = chunk.content().filter(|f| !f.is_empty()) {
                    self.content.push_str(fragment);
                    on_delta(fragment);
                }
            }
            Err(e) => {
                self.skipped_frames += 1;
                warn!(error = %e, frame = %payload, "Skipping malformed stream frame");
            }
        }

        false
    }
}

/// Drive a byte stream through a [`StreamAssembler`] to completion.
///
/// Stops reading as soon as `[DONE]` is seen, even if the transport has more
/// to send. A transport error fails the whole call; fragments already passed
/// to `on_delta` are not taken back.
pub async fn assemble_stream<S, F>(stream: S, mut on_delta: F) -> Result<ChatMessage, LlmError>
where
    S: Stream<Item = Result<Vec<u8>, LlmError>>,
    F: FnMut(&str),
{
    let mut stream = std::pin::pin!(stream);
    let mut assembler = StreamAssembler::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if assembler.push(&chunk, &mut on_delta) {
            break;
        }
    }

    Ok(assembler.finish(&mut on_delta))
}
