//! Storage trait — the relational persistence collaborator.
//!
//! One implementation lives in `kindred-storage` (SQLite via sqlx). The chat
//! engine only ever touches `get_companion` / `create_message`; the wider
//! surface serves the gateway and the ingestion pipeline.
//!
//! Deleting a companion cascades to its messages and knowledge files at the
//! relational layer. Vector and cache cleanup are the caller's explicit
//! responsibility — they are not database cascades.

use crate::companion::{Companion, CompanionUpdate, NewCompanion};
use crate::error::StorageError;
use crate::knowledge::{FileStatus, KnowledgeFile, NewKnowledgeFile};
use crate::message::{ChatMessage, MessageOrder, NewMessage};
use crate::user::{NewUser, User};
use async_trait::async_trait;
use uuid::Uuid;

/// The relational persistence contract.
#[async_trait]
pub trait Storage: Send + Sync {
    /// The backend name (e.g., "sqlite").
    fn name(&self) -> &str;

    // --- Users ---

    async fn create_user(&self, user: NewUser) -> Result<User, StorageError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StorageError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;

    // --- Companions ---

    async fn create_companion(
        &self,
        owner_id: Uuid,
        companion: NewCompanion,
    ) -> Result<Companion, StorageError>;

    /// Fresh read — the chat engine re-resolves the companion on every turn.
    async fn get_companion(&self, id: Uuid) -> Result<Option<Companion>, StorageError>;

    async fn list_companions_by_owner(
        &self,
        owner_id: Uuid,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<Companion>, StorageError>;

    /// Partial update; returns the updated row, or `None` if it doesn't exist.
    async fn update_companion(
        &self,
        id: Uuid,
        update: CompanionUpdate,
    ) -> Result<Option<Companion>, StorageError>;

    /// Deletes the companion row; messages and knowledge files go with it
    /// (FK cascade). Returns whether a row was deleted.
    async fn delete_companion(&self, id: Uuid) -> Result<bool, StorageError>;

    // --- Messages ---

    async fn create_message(&self, message: NewMessage) -> Result<ChatMessage, StorageError>;

    async fn list_messages(
        &self,
        companion_id: Uuid,
        user_id: Uuid,
        order: MessageOrder,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StorageError>;

    // --- Knowledge files ---

    async fn create_knowledge_file(
        &self,
        file: NewKnowledgeFile,
    ) -> Result<KnowledgeFile, StorageError>;

    async fn get_knowledge_file(&self, id: Uuid) -> Result<Option<KnowledgeFile>, StorageError>;

    async fn list_knowledge_files(
        &self,
        companion_id: Uuid,
    ) -> Result<Vec<KnowledgeFile>, StorageError>;

    /// Apply a status transition. Rejects non-monotonic transitions with
    /// `StorageError::InvalidTransition`; returns `None` for a missing file.
    async fn update_file_status(
        &self,
        id: Uuid,
        status: FileStatus,
        error_message: Option<&str>,
    ) -> Result<Option<KnowledgeFile>, StorageError>;

    async fn delete_knowledge_file(&self, id: Uuid) -> Result<bool, StorageError>;
}
