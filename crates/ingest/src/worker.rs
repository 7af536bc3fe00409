//! The ingestion worker — extract, chunk, embed, upsert, transition.

use crate::chunker::chunk_text;
use crate::extract::extract_text;
use kindred_core::error::{Error, IngestError};
use kindred_core::knowledge::FileStatus;
use kindred_core::provider::{EmbeddingRequest, Provider};
use kindred_core::storage::Storage;
use kindred_core::vector::{VectorIndex, VectorRecord};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Processes uploaded documents into companion-scoped vectors.
///
/// Every file moves UPLOADED → PROCESSING → {INDEXED | FAILED}; a FAILED file
/// records the error class on the row. The worker itself never propagates a
/// per-file failure — the status row is the report.
pub struct IngestWorker {
    storage: Arc<dyn Storage>,
    index: Arc<dyn VectorIndex>,
    provider: Arc<dyn Provider>,
    embedding_model: String,
    chunk_size: usize,
    chunk_overlap: usize,
    embed_batch_size: usize,
}

impl IngestWorker {
    pub fn new(
        storage: Arc<dyn Storage>,
        index: Arc<dyn VectorIndex>,
        provider: Arc<dyn Provider>,
        embedding_model: impl Into<String>,
        chunk_size: usize,
        chunk_overlap: usize,
        embed_batch_size: usize,
    ) -> Self {
        Self {
            storage,
            index,
            provider,
            embedding_model: embedding_model.into(),
            chunk_size,
            chunk_overlap,
            embed_batch_size: embed_batch_size.max(1),
        }
    }

    /// Process one uploaded file end to end.
    pub async fn process_file(&self, file_id: Uuid) {
        info!(file_id = %file_id, "Ingestion started");

        match self.try_process(file_id).await {
            Ok(chunks) => {
                info!(file_id = %file_id, chunks, "Ingestion complete, file indexed");
            }
            Err(e) => {
                error!(file_id = %file_id, error = %e, "Ingestion failed");
                // Best effort; if even the status write fails there is
                // nothing left to report to.
                if let Err(update_err) = self
                    .storage
                    .update_file_status(file_id, FileStatus::Failed, Some(&e.to_string()))
                    .await
                {
                    error!(
                        file_id = %file_id,
                        error = %update_err,
                        "Could not record ingestion failure"
                    );
                }
            }
        }
    }

    async fn try_process(&self, file_id: Uuid) -> Result<usize, Error> {
        let file = self
            .storage
            .update_file_status(file_id, FileStatus::Processing, None)
            .await?
            .ok_or_else(|| Error::Internal(format!("knowledge file {file_id} not found")))?;

        let text = extract_text(Path::new(&file.file_path)).await?;

        let chunks = chunk_text(&text, self.chunk_size, self.chunk_overlap);
        if chunks.is_empty() {
            return Err(IngestError::EmptyDocument(file.file_name.clone()).into());
        }
        info!(file_id = %file_id, chunks = chunks.len(), "Document split into chunks");

        for (batch_index, batch) in chunks.chunks(self.embed_batch_size).enumerate() {
            let offset = batch_index * self.embed_batch_size;

            let response = self
                .provider
                .embed(EmbeddingRequest {
                    model: self.embedding_model.clone(),
                    inputs: batch.to_vec(),
                })
                .await
                .map_err(|e| IngestError::EmbeddingFailed(e.to_string()))?;

            if response.embeddings.len() != batch.len() {
                return Err(IngestError::EmbeddingFailed(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                ))
                .into());
            }

            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(response.embeddings)
                .enumerate()
                .map(|(j, (chunk, embedding))| VectorRecord {
                    id: VectorRecord::chunk_id(file.id, offset + j),
                    companion_id: file.companion_id,
                    file_id: file.id,
                    file_name: file.file_name.clone(),
                    chunk_index: offset + j,
                    text: chunk.clone(),
                    embedding,
                })
                .collect();

            self.index.upsert(records).await?;
        }

        self.storage
            .update_file_status(file_id, FileStatus::Indexed, None)
            .await?;

        Ok(chunks.len())
    }

    /// Remove every vector belonging to a deleted file. Idempotent.
    pub async fn purge_file_vectors(&self, file_id: Uuid) {
        match self.index.delete_by_file(file_id).await {
            Ok(removed) => info!(file_id = %file_id, removed, "File vectors purged"),
            Err(e) => warn!(file_id = %file_id, error = %e, "File vector purge failed"),
        }
    }

    /// Remove every vector belonging to a deleted companion. Idempotent.
    pub async fn purge_companion_vectors(&self, companion_id: Uuid) {
        match self.index.delete_by_companion(companion_id).await {
            Ok(removed) => info!(companion_id = %companion_id, removed, "Companion vectors purged"),
            Err(e) => warn!(companion_id = %companion_id, error = %e, "Companion vector purge failed"),
        }
    }
}
