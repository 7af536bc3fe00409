//! Shared test helpers for pipeline tests.

use async_trait::async_trait;
use kindred_core::error::ProviderError;
use kindred_core::provider::{
    EmbeddingRequest, EmbeddingResponse, PromptMessage, Provider, ProviderRequest,
    ProviderResponse, StreamChunk,
};
use std::sync::Mutex;

/// Deterministic embedding used across tests: a 26-dim letter-frequency
/// histogram, so texts sharing words land close together in cosine space.
pub fn histogram_embedding(text: &str) -> Vec<f32> {
    let mut counts = vec![0.0f32; 26];
    for c in text.to_lowercase().chars() {
        if c.is_ascii_lowercase() {
            counts[(c as u8 - b'a') as usize] += 1.0;
        }
    }
    counts
}

/// A mock provider with scripted behavior for all three call shapes.
///
/// - `complete` returns a fixed text (the classifier path),
/// - `stream` yields the scripted fragments, optionally failing mid-stream,
/// - `embed` produces histogram embeddings.
///
/// Every request is recorded so tests can assert on composed prompts.
pub struct ScriptedProvider {
    fragments: Vec<String>,
    stream_error_after: Option<usize>,
    completion: String,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    /// A provider that streams the given fragments then ends normally.
    pub fn streaming<S: Into<String>>(fragments: Vec<S>) -> Self {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            stream_error_after: None,
            completion: r#"{"primary_intent": "casual_chat", "confidence": 0.9}"#.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail the stream after `n` fragments have been delivered.
    pub fn with_stream_error_after(mut self, n: usize) -> Self {
        self.stream_error_after = Some(n);
        self
    }

    /// Fix the non-streaming completion text (the classifier's raw output).
    pub fn with_completion(mut self, text: &str) -> Self {
        self.completion = text.into();
        self
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Only the streaming (generation) requests.
    pub fn streaming_requests(&self) -> Vec<ProviderRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.stream)
            .collect()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        Ok(ProviderResponse {
            message: PromptMessage::assistant(self.completion.clone()),
            usage: None,
            model: "scripted".into(),
            metadata: serde_json::Map::new(),
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        self.requests.lock().unwrap().push(request);

        let fragments = self.fragments.clone();
        let error_after = self.stream_error_after;
        let (tx, rx) = tokio::sync::mpsc::channel(8);

        tokio::spawn(async move {
            let total = fragments.len();
            for (i, fragment) in fragments.into_iter().enumerate() {
                if error_after == Some(i) {
                    let _ = tx
                        .send(Err(ProviderError::StreamInterrupted(
                            "scripted interruption".into(),
                        )))
                        .await;
                    return;
                }
                if tx
                    .send(Ok(StreamChunk {
                        content: Some(fragment),
                        done: false,
                        usage: None,
                    }))
                    .await
                    .is_err()
                {
                    return; // receiver dropped
                }
            }

            if error_after == Some(total) {
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(
                        "scripted interruption".into(),
                    )))
                    .await;
                return;
            }

            let _ = tx
                .send(Ok(StreamChunk {
                    content: None,
                    done: true,
                    usage: None,
                }))
                .await;
        });

        Ok(rx)
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> Result<EmbeddingResponse, ProviderError> {
        Ok(EmbeddingResponse {
            embeddings: request
                .inputs
                .iter()
                .map(|t| histogram_embedding(t))
                .collect(),
            model: request.model,
            usage: None,
        })
    }
}
