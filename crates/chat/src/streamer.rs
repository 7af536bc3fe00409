//! Streaming generation.
//!
//! `GenerationStreamer` drives one streaming chat-completion call and hands
//! back a `ReplyStream`: a finite, non-restartable sequence of text
//! fragments that accumulates the full reply as a side effect, so the caller
//! can persist the complete turn without re-concatenating at the transport
//! boundary.

use crate::composer::ComposedPrompt;
use kindred_core::error::ProviderError;
use kindred_core::provider::{Provider, ProviderRequest, StreamChunk};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Drives streaming chat-completion calls against one provider/model.
pub struct GenerationStreamer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GenerationStreamer {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }

    /// Begin generating a reply for the composed prompt.
    pub async fn start(&self, prompt: ComposedPrompt) -> Result<ReplyStream, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: prompt.into_messages(),
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            stream: true,
        };

        debug!(model = %self.model, "Starting reply generation");
        let rx = self.provider.stream(request).await?;

        Ok(ReplyStream {
            rx,
            full_text: String::new(),
            finished: false,
        })
    }
}

/// A finite sequence of reply fragments.
///
/// Terminates on the provider's natural end-of-stream; a mid-stream error is
/// delivered once as `Some(Err(..))` and ends the sequence. Dropping the
/// stream aborts the upstream call.
pub struct ReplyStream {
    rx: mpsc::Receiver<Result<StreamChunk, ProviderError>>,
    full_text: String,
    finished: bool,
}

impl ReplyStream {
    /// The next text fragment, or `None` once the stream has ended.
    pub async fn next_fragment(&mut self) -> Option<Result<String, ProviderError>> {
        if self.finished {
            return None;
        }

        loop {
            match self.rx.recv().await {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Some(Ok(chunk)) => {
                    if chunk.done {
                        self.finished = true;
                        // A final chunk may still carry trailing content.
                        match chunk.content {
                            Some(content) if !content.is_empty() => {
                                self.full_text.push_str(&content);
                                return Some(Ok(content));
                            }
                            _ => return None,
                        }
                    }
                    if let Some(content) = chunk.content
                        && !content.is_empty()
                    {
                        self.full_text.push_str(&content);
                        return Some(Ok(content));
                    }
                    // Keep waiting past empty keep-alive chunks.
                }
            }
        }
    }

    /// The reply accumulated so far.
    pub fn text(&self) -> &str {
        &self.full_text
    }

    /// Whether the sequence has ended.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume the stream, yielding the full accumulated reply.
    pub fn into_text(self) -> String {
        self.full_text
    }
}
