//! Per-extension document text extraction.

use kindred_core::error::IngestError;
use std::path::Path;

/// Load a document's text content, choosing the loader by file extension.
///
/// Plain text and Markdown are supported; anything else fails the file with
/// an explicit unsupported-type error recorded on the knowledge file.
pub async fn extract_text(path: &Path) -> Result<String, IngestError> {
    if !path.exists() {
        return Err(IngestError::FileNotFound(path.display().to_string()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "md" | "markdown" => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IngestError::Io(format!("{}: {e}", path.display()))),
        other => Err(IngestError::UnsupportedFileType(format!(
            ".{other} ({})",
            path.display()
        ))),
    }
}
