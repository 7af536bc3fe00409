//! Background document ingestion.
//!
//! Upload handlers register a `KnowledgeFile` (status UPLOADED) and enqueue a
//! job; the worker loads the document, splits it into overlapping chunks,
//! embeds them in batches, upserts companion-scoped vectors, and transitions
//! the file to INDEXED — or FAILED with the error recorded. Cleanup jobs
//! remove vectors when files or companions are deleted.

pub mod chunker;
pub mod extract;
pub mod queue;
pub mod worker;

pub use chunker::chunk_text;
pub use extract::extract_text;
pub use queue::{IngestJob, JobQueue};
pub use worker::IngestWorker;
