//! Backup catalog routes.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::{ApiResponse, AppError};
use crate::models::backup::{Backup, CreateBackup};
use crate::models::change::ActorRequest;
use crate::services::mutation::{self, MutationOutcome};
use crate::AppState;

/// GET /api/v1/nsgs/{id}/backups - backups for one group, newest first.
pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Backup>>>, AppError> {
    let backups = mutation::list_backups(state.store.as_ref(), id).await?;
    Ok(ApiResponse::success(backups))
}

/// POST /api/v1/nsgs/{id}/backups - snapshot the current configuration.
pub async fn create(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CreateBackup>,
) -> Result<Json<ApiResponse<Backup>>, AppError> {
    let backup = mutation::create_backup(&state.mutation_deps(), id, body).await?;
    Ok(ApiResponse::success(backup))
}

/// POST /api/v1/nsgs/{id}/backups/{backup_id}/restore - re-apply a backup,
/// authority first.
pub async fn restore(
    State(state): State<AppState>,
    Path((id, backup_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ActorRequest>,
) -> Result<Json<ApiResponse<MutationOutcome>>, AppError> {
    let outcome =
        mutation::restore_from_backup(&state.mutation_deps(), id, backup_id, body.actor).await?;
    Ok(ApiResponse::success(outcome))
}
