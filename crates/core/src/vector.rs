//! Vector index trait — the similarity-search collaborator.
//!
//! Records are scoped to a companion through metadata; the `query` contract
//! makes that scoping a hard multi-tenancy invariant — an implementation must
//! never return a match whose `companion_id` differs from the query scope.

use crate::error::IndexError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One embedded chunk stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Unique, traceable ID — conventionally `{file_id}_{chunk_index}`.
    pub id: String,

    /// Scope metadata: which companion's knowledge base this chunk belongs to
    pub companion_id: Uuid,

    /// The source document
    pub file_id: Uuid,

    /// Display name of the source document
    pub file_name: String,

    /// Position of this chunk within the source document
    pub chunk_index: usize,

    /// The raw chunk text — returned verbatim at query time
    pub text: String,

    /// The embedding vector
    pub embedding: Vec<f32>,
}

impl VectorRecord {
    /// The conventional record ID for a chunk of a file.
    pub fn chunk_id(file_id: Uuid, chunk_index: usize) -> String {
        format!("{file_id}_{chunk_index}")
    }
}

/// A ranked query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    /// The chunk text
    pub text: String,

    /// Similarity to the query (descending order across a result set)
    pub score: f32,

    /// Source document
    pub file_id: Uuid,

    /// Display name of the source document
    pub file_name: String,
}

/// The vector index contract.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The index name (e.g., "sqlite").
    fn name(&self) -> &str;

    /// Insert or replace records (keyed by `VectorRecord::id`).
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), IndexError>;

    /// Top-k most similar records within one companion's scope, descending
    /// relevance. Must never cross companion boundaries.
    async fn query(
        &self,
        embedding: &[f32],
        companion_id: Uuid,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, IndexError>;

    /// Remove every vector belonging to one source document. Idempotent.
    async fn delete_by_file(&self, file_id: Uuid) -> Result<u64, IndexError>;

    /// Remove every vector belonging to one companion. Idempotent.
    async fn delete_by_companion(&self, companion_id: Uuid) -> Result<u64, IndexError>;
}
