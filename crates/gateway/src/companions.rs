//! Companion CRUD routes.

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::SharedState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use kindred_core::companion::{Companion, CompanionUpdate, NewCompanion};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

/// Load a companion and enforce ownership. Missing and not-owned stay
/// distinct error classes all the way to the client.
pub async fn owned_companion(
    state: &SharedState,
    companion_id: Uuid,
    owner_id: Uuid,
) -> Result<Companion, ApiError> {
    let companion = state
        .storage
        .get_companion(companion_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("companion not found".into()))?;

    if companion.owner_id != owner_id {
        return Err(ApiError::Forbidden("not enough permissions".into()));
    }
    Ok(companion)
}

/// `POST /api/v1/companions`
pub async fn create_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<NewCompanion>,
) -> Result<(StatusCode, Json<Companion>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    if body.instructions.trim().is_empty() {
        return Err(ApiError::BadRequest("instructions must not be empty".into()));
    }

    let companion = state.storage.create_companion(user.id, body).await?;
    info!(companion_id = %companion.id, owner_id = %user.id, "Companion created");
    Ok((StatusCode::CREATED, Json(companion)))
}

/// `GET /api/v1/companions`
pub async fn list_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Companion>>, ApiError> {
    let companions = state
        .storage
        .list_companions_by_owner(user.id, page.skip, page.limit)
        .await?;
    Ok(Json(companions))
}

/// `GET /api/v1/companions/{id}`
pub async fn get_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(companion_id): Path<Uuid>,
) -> Result<Json<Companion>, ApiError> {
    let companion = owned_companion(&state, companion_id, user.id).await?;
    Ok(Json(companion))
}

/// `PATCH /api/v1/companions/{id}`
pub async fn update_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(companion_id): Path<Uuid>,
    Json(update): Json<CompanionUpdate>,
) -> Result<Json<Companion>, ApiError> {
    owned_companion(&state, companion_id, user.id).await?;

    let companion = state
        .storage
        .update_companion(companion_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("companion not found".into()))?;
    Ok(Json(companion))
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// `DELETE /api/v1/companions/{id}`
///
/// Full cascade, in this order: vectors, session memory, then the relational
/// row last — the row is the authoritative existence check, so a crash
/// mid-sequence leaves a delete that can simply be re-run. Vector and cache
/// deletes are idempotent.
pub async fn delete_handler(
    State(state): State<SharedState>,
    CurrentUser(user): CurrentUser,
    Path(companion_id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let companion = owned_companion(&state, companion_id, user.id).await?;
    let companion_name = companion.name.clone();

    state
        .index
        .delete_by_companion(companion_id)
        .await
        .map_err(|e| ApiError::Internal(format!("vector cleanup: {e}")))?;

    state
        .memory
        .forget(companion_id, user.id)
        .await
        .map_err(|e| ApiError::Internal(format!("memory cleanup: {e}")))?;

    // Uploaded documents on disk go with the companion; best-effort.
    for file in state.storage.list_knowledge_files(companion_id).await? {
        if let Some(parent) = std::path::Path::new(&file.file_path).parent() {
            let _ = tokio::fs::remove_dir_all(parent).await;
        }
    }

    // Messages and knowledge-file rows cascade with the companion row.
    state.storage.delete_companion(companion_id).await?;

    info!(companion_id = %companion_id, owner_id = %user.id, "Companion fully deleted");
    Ok(Json(DeleteResponse {
        message: format!("Companion '{companion_name}' has been fully deleted."),
    }))
}
