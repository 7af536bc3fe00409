//! SQLite-backed vector index.
//!
//! One table holds embedded chunks with their scope metadata. Candidate rows
//! are filtered by companion in SQL; ranking happens in Rust with cosine
//! similarity. Embeddings are stored as little-endian f32 BLOBs.

use crate::similarity::cosine_similarity;
use async_trait::async_trait;
use chrono::Utc;
use kindred_core::error::IndexError;
use kindred_core::vector::{VectorIndex, VectorMatch, VectorRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A SQLite-backed vector index with companion-scoped metadata filtering.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    /// Open (or create) the index at the given path.
    pub async fn new(path: &str) -> Result<Self, IndexError> {
        Self::with_max_connections(path, 4).await
    }

    /// An in-process ephemeral index for tests.
    pub async fn in_memory() -> Result<Self, IndexError> {
        Self::with_max_connections(":memory:", 1).await
    }

    async fn with_max_connections(path: &str, max: u32) -> Result<Self, IndexError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| IndexError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max)
            .connect_with(options)
            .await
            .map_err(|e| IndexError::Storage(format!("Failed to open SQLite: {e}")))?;

        let index = Self { pool };
        index.run_migrations().await?;
        info!("SQLite vector index initialized at {path}");
        Ok(index)
    }

    async fn run_migrations(&self) -> Result<(), IndexError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vectors (
                id           TEXT PRIMARY KEY,
                companion_id TEXT NOT NULL,
                file_id      TEXT NOT NULL,
                file_name    TEXT NOT NULL,
                chunk_index  INTEGER NOT NULL,
                content      TEXT NOT NULL,
                embedding    BLOB NOT NULL,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexError::Storage(format!("vectors table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_companion ON vectors(companion_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::Storage(format!("companion index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_file ON vectors(file_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::Storage(format!("file index: {e}")))?;

        Ok(())
    }

    /// Serialize an embedding vector to bytes.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize an embedding blob back to a vector.
    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), IndexError> {
        let now = Utc::now().to_rfc3339();

        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO vectors
                    (id, companion_id, file_id, file_name, chunk_index, content,
                     embedding, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO UPDATE SET
                    companion_id = excluded.companion_id,
                    file_id = excluded.file_id,
                    file_name = excluded.file_name,
                    chunk_index = excluded.chunk_index,
                    content = excluded.content,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&record.id)
            .bind(record.companion_id.to_string())
            .bind(record.file_id.to_string())
            .bind(&record.file_name)
            .bind(record.chunk_index as i64)
            .bind(&record.text)
            .bind(Self::embedding_to_blob(&record.embedding))
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::Storage(format!("upsert vector {}: {e}", record.id)))?;
        }

        debug!(count = records.len(), "Vectors upserted");
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        companion_id: Uuid,
        top_k: usize,
    ) -> Result<Vec<VectorMatch>, IndexError> {
        let rows = sqlx::query(
            "SELECT content, embedding, file_id, file_name FROM vectors WHERE companion_id = ?1",
        )
        .bind(companion_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexError::QueryFailed(format!("scope scan: {e}")))?;

        let mut scored: Vec<VectorMatch> = Vec::with_capacity(rows.len());
        for row in &rows {
            let content: String = row
                .try_get("content")
                .map_err(|e| IndexError::QueryFailed(format!("content column: {e}")))?;
            let blob: Vec<u8> = row
                .try_get("embedding")
                .map_err(|e| IndexError::QueryFailed(format!("embedding column: {e}")))?;
            let file_id: String = row
                .try_get("file_id")
                .map_err(|e| IndexError::QueryFailed(format!("file_id column: {e}")))?;
            let file_name: String = row
                .try_get("file_name")
                .map_err(|e| IndexError::QueryFailed(format!("file_name column: {e}")))?;

            let candidate = Self::blob_to_embedding(&blob);
            scored.push(VectorMatch {
                score: cosine_similarity(&candidate, embedding),
                text: content,
                file_id: Uuid::parse_str(&file_id)
                    .map_err(|e| IndexError::QueryFailed(format!("file_id column: {e}")))?,
                file_name,
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete_by_file(&self, file_id: Uuid) -> Result<u64, IndexError> {
        let result = sqlx::query("DELETE FROM vectors WHERE file_id = ?1")
            .bind(file_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::Storage(format!("delete by file: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn delete_by_companion(&self, companion_id: Uuid) -> Result<u64, IndexError> {
        let result = sqlx::query("DELETE FROM vectors WHERE companion_id = ?1")
            .bind(companion_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| IndexError::Storage(format!("delete by companion: {e}")))?;
        Ok(result.rows_affected())
    }
}
