//! # Kindred Core
//!
//! Domain types, traits, and error definitions for the Kindred companion
//! backend. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (LLM provider, relational store, vector index,
//! session cache) is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod cache;
pub mod companion;
pub mod error;
pub mod intent;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod storage;
pub mod user;
pub mod vector;

// Re-export key types at crate root for ergonomics
pub use cache::CacheStore;
pub use companion::{Companion, CompanionUpdate, NewCompanion};
pub use error::{Error, Result};
pub use intent::{EmotionalState, Intent, IntentAnalysisResult, Receptivity};
pub use knowledge::{FileStatus, KnowledgeBaseStatus, KnowledgeFile, NewKnowledgeFile};
pub use message::{ChatMessage, MessageOrder, NewMessage, Role, Turn};
pub use provider::{
    EmbeddingRequest, EmbeddingResponse, PromptMessage, PromptRole, Provider, ProviderRequest,
    ProviderResponse, StreamChunk, Usage,
};
pub use storage::Storage;
pub use user::{NewUser, User};
pub use vector::{VectorIndex, VectorMatch, VectorRecord};
