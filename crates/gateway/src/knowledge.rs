//! Knowledge file routes: upload, list, delete.

use crate::auth::CurrentUser;
use crate::companions::owned_companion;
use crate::error::ApiError;
use crate::SharedState;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use kindred_core::knowledge::{KnowledgeBaseStatus, KnowledgeFile, NewKnowledgeFile};
use kindred_ingest::IngestJob;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Strip any path components from a client-supplied file name.
fn sanitize_file_name(raw: &str) -> Result<String, ApiError> {
    let name = std::path::Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("invalid file name".into()))?;
    if name.is_empty() || name.starts_with('.') {
        return Err(ApiError::BadRequest("invalid file name".into()));
    }
    Ok(name)
}

/// `POST /api/v1/companions/{id}/knowledge/upload`
///
/// Accepts one multipart `file` field, stores the bytes under
/// `{upload_dir}/{user_id}/{file_id}/`, registers the knowledge file
/// (status UPLOADED), and enqueues ingestion. Responds 202 — indexing
/// happens in the background.
pub async fn upload_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(companion_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<KnowledgeFile>), ApiError> {
    owned_companion(&state, companion_id, user.id).await?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
        .ok_or_else(|| ApiError::BadRequest("missing file field".into()))?;

    let file_name = sanitize_file_name(
        field
            .file_name()
            .ok_or_else(|| ApiError::BadRequest("missing file name".into()))?,
    )?;
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".into()));
    }

    // The row ID doubles as the directory name, so the path stays traceable.
    let file_id = Uuid::new_v4();
    let dir = std::path::Path::new(&state.config.ingest.upload_dir)
        .join(user.id.to_string())
        .join(file_id.to_string());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::Internal(format!("create upload dir: {e}")))?;
    let path = dir.join(&file_name);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("write upload: {e}")))?;

    let file = state
        .storage
        .create_knowledge_file(NewKnowledgeFile {
            id: file_id,
            companion_id,
            file_name,
            file_path: path.display().to_string(),
        })
        .await?;

    state.jobs.enqueue(IngestJob::ProcessFile(file.id)).await?;
    info!(file_id = %file.id, companion_id = %companion_id, "Knowledge file uploaded, ingestion enqueued");

    Ok((StatusCode::ACCEPTED, Json(file)))
}

#[derive(Serialize)]
pub struct KnowledgeListResponse {
    /// Derived from the file statuses, never stored.
    pub status: KnowledgeBaseStatus,
    pub files: Vec<KnowledgeFile>,
}

/// `GET /api/v1/companions/{id}/knowledge`
pub async fn list_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(companion_id): Path<Uuid>,
) -> Result<Json<KnowledgeListResponse>, ApiError> {
    owned_companion(&state, companion_id, user.id).await?;

    let files = state.storage.list_knowledge_files(companion_id).await?;
    let statuses: Vec<_> = files.iter().map(|f| f.status).collect();

    Ok(Json(KnowledgeListResponse {
        status: KnowledgeBaseStatus::aggregate(&statuses),
        files,
    }))
}

#[derive(Serialize)]
pub struct DeleteFileResponse {
    pub message: String,
}

/// `DELETE /api/v1/knowledge/{file_id}`
///
/// Vector removal runs as a background job; the backing file and the row go
/// immediately.
pub async fn delete_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(file_id): Path<Uuid>,
) -> Result<Json<DeleteFileResponse>, ApiError> {
    let file = state
        .storage
        .get_knowledge_file(file_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("knowledge file not found".into()))?;

    owned_companion(&state, file.companion_id, user.id).await?;

    state
        .jobs
        .enqueue(IngestJob::PurgeFileVectors(file_id))
        .await?;

    if let Some(parent) = std::path::Path::new(&file.file_path).parent() {
        let _ = tokio::fs::remove_dir_all(parent).await;
    }

    state.storage.delete_knowledge_file(file_id).await?;
    info!(file_id = %file_id, "Knowledge file deleted, vector purge enqueued");

    Ok(Json(DeleteFileResponse {
        message: format!("Knowledge file '{}' deleted.", file.file_name),
    }))
}
