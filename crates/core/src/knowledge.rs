//! Knowledge file domain types.
//!
//! An uploaded document tied to one companion. Status transitions are
//! monotonic: UPLOADED → PROCESSING → {INDEXED | FAILED}. Only the ingestion
//! pipeline mutates a file after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing status of one uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    Uploaded,
    Processing,
    Indexed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Uploaded => "UPLOADED",
            FileStatus::Processing => "PROCESSING",
            FileStatus::Indexed => "INDEXED",
            FileStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UPLOADED" => Some(FileStatus::Uploaded),
            "PROCESSING" => Some(FileStatus::Processing),
            "INDEXED" => Some(FileStatus::Indexed),
            "FAILED" => Some(FileStatus::Failed),
            _ => None,
        }
    }

    /// Whether moving to `next` respects the monotonic lifecycle.
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Uploaded, FileStatus::Processing)
                | (FileStatus::Processing, FileStatus::Indexed)
                | (FileStatus::Processing, FileStatus::Failed)
                // Re-running a failed ingestion is allowed.
                | (FileStatus::Failed, FileStatus::Processing)
        )
    }

    /// Terminal states never transition again (except FAILED → retry).
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Indexed | FileStatus::Failed)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded document associated with one companion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeFile {
    pub id: Uuid,

    /// The companion whose knowledge base this document feeds
    pub companion_id: Uuid,

    /// Original display file name
    pub file_name: String,

    /// Where the raw bytes live on disk
    pub file_path: String,

    pub status: FileStatus,

    /// Populated when status is FAILED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a freshly uploaded file (status starts at UPLOADED).
#[derive(Debug, Clone)]
pub struct NewKnowledgeFile {
    /// Pre-generated ID — the upload path embeds it, so the caller owns it.
    pub id: Uuid,
    pub companion_id: Uuid,
    pub file_name: String,
    pub file_path: String,
}

/// Knowledge-base readiness of one companion, derived from its files.
///
/// Not stored anywhere — always computed from the file statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KnowledgeBaseStatus {
    Empty,
    Processing,
    Ready,
    Failed,
}

impl KnowledgeBaseStatus {
    /// Aggregate file statuses into a knowledge-base status.
    ///
    /// Any in-flight file dominates; otherwise one indexed file is enough to
    /// serve retrieval, and all-failed means the base is unusable.
    pub fn aggregate(statuses: &[FileStatus]) -> Self {
        if statuses.is_empty() {
            return KnowledgeBaseStatus::Empty;
        }
        if statuses
            .iter()
            .any(|s| matches!(s, FileStatus::Uploaded | FileStatus::Processing))
        {
            return KnowledgeBaseStatus::Processing;
        }
        if statuses.iter().any(|s| *s == FileStatus::Indexed) {
            return KnowledgeBaseStatus::Ready;
        }
        KnowledgeBaseStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_monotonic() {
        assert!(FileStatus::Uploaded.can_transition_to(FileStatus::Processing));
        assert!(FileStatus::Processing.can_transition_to(FileStatus::Indexed));
        assert!(FileStatus::Processing.can_transition_to(FileStatus::Failed));

        assert!(!FileStatus::Indexed.can_transition_to(FileStatus::Processing));
        assert!(!FileStatus::Uploaded.can_transition_to(FileStatus::Indexed));
        assert!(!FileStatus::Indexed.can_transition_to(FileStatus::Failed));
    }

    #[test]
    fn failed_ingestion_can_retry() {
        assert!(FileStatus::Failed.can_transition_to(FileStatus::Processing));
    }

    #[test]
    fn status_round_trips_through_token() {
        for status in [
            FileStatus::Uploaded,
            FileStatus::Processing,
            FileStatus::Indexed,
            FileStatus::Failed,
        ] {
            assert_eq!(FileStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FileStatus::parse("DONE"), None);
    }

    #[test]
    fn aggregate_empty() {
        assert_eq!(
            KnowledgeBaseStatus::aggregate(&[]),
            KnowledgeBaseStatus::Empty
        );
    }

    #[test]
    fn aggregate_in_flight_dominates() {
        assert_eq!(
            KnowledgeBaseStatus::aggregate(&[FileStatus::Indexed, FileStatus::Processing]),
            KnowledgeBaseStatus::Processing
        );
        assert_eq!(
            KnowledgeBaseStatus::aggregate(&[FileStatus::Failed, FileStatus::Uploaded]),
            KnowledgeBaseStatus::Processing
        );
    }

    #[test]
    fn aggregate_ready_and_failed() {
        assert_eq!(
            KnowledgeBaseStatus::aggregate(&[FileStatus::Indexed, FileStatus::Failed]),
            KnowledgeBaseStatus::Ready
        );
        assert_eq!(
            KnowledgeBaseStatus::aggregate(&[FileStatus::Failed]),
            KnowledgeBaseStatus::Failed
        );
    }
}
