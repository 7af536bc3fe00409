//! Companion-scoped vector retrieval.
//!
//! Documents are embedded at ingestion time and queries at chat time with
//! the same embedding model; similarity search is always filtered to one
//! companion's scope — the multi-tenancy line other companions' private
//! documents must never cross.

pub mod retriever;
pub mod similarity;
pub mod sqlite_index;

pub use retriever::KnowledgeRetriever;
pub use similarity::cosine_similarity;
pub use sqlite_index::SqliteVectorIndex;
