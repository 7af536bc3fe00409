//! The knowledge retriever — query embedding plus scoped similarity search.

use kindred_core::provider::{EmbeddingRequest, Provider};
use kindred_core::vector::VectorIndex;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Retrieves grounding snippets for one companion's knowledge base.
///
/// Absence of knowledge is an accepted state, not an error: any failure along
/// the way (embedding call, index query) yields an empty result and the
/// conversation degrades to an ungrounded persona-only reply.
pub struct KnowledgeRetriever {
    provider: Arc<dyn Provider>,
    index: Arc<dyn VectorIndex>,
    embedding_model: String,
    top_k: usize,
}

impl KnowledgeRetriever {
    pub fn new(
        provider: Arc<dyn Provider>,
        index: Arc<dyn VectorIndex>,
        embedding_model: impl Into<String>,
        top_k: usize,
    ) -> Self {
        Self {
            provider,
            index,
            embedding_model: embedding_model.into(),
            top_k,
        }
    }

    /// Top-k relevant snippet texts for `query` within `companion_id`'s
    /// scope, descending relevance. Never fails.
    pub async fn retrieve(&self, query: &str, companion_id: Uuid) -> Vec<String> {
        self.retrieve_top_k(query, companion_id, self.top_k).await
    }

    /// Same as [`retrieve`](Self::retrieve) with an explicit result count.
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        companion_id: Uuid,
        top_k: usize,
    ) -> Vec<String> {
        let embedding = match self
            .provider
            .embed(EmbeddingRequest {
                model: self.embedding_model.clone(),
                inputs: vec![query.to_string()],
            })
            .await
        {
            Ok(response) => match response.embeddings.into_iter().next() {
                Some(embedding) => embedding,
                None => {
                    warn!(companion_id = %companion_id, "Embedding response was empty");
                    return Vec::new();
                }
            },
            Err(e) => {
                warn!(companion_id = %companion_id, error = %e, "Query embedding failed");
                return Vec::new();
            }
        };

        match self.index.query(&embedding, companion_id, top_k).await {
            Ok(matches) => {
                debug!(
                    companion_id = %companion_id,
                    count = matches.len(),
                    "Knowledge snippets retrieved"
                );
                matches.into_iter().map(|m| m.text).collect()
            }
            Err(e) => {
                warn!(companion_id = %companion_id, error = %e, "Vector index query failed");
                Vec::new()
            }
        }
    }
}
