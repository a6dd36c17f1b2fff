//! Change ledger routes.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::{ApiResponse, AppError};
use crate::models::change::{ActorRequest, ChangeRecord};
use crate::services::ledger;
use crate::services::mutation::{self, MutationOutcome};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ChangeListQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/nsgs/{id}/changes - ledger entries, newest first.
pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ChangeListQuery>,
) -> Result<Json<ApiResponse<Vec<ChangeRecord>>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let changes = ledger::list_changes(state.store.as_ref(), id, limit).await?;
    Ok(ApiResponse::success(changes))
}

/// POST /api/v1/nsgs/{id}/changes/{change_id}/rollback - undo one recorded
/// change, authority first.
pub async fn rollback(
    State(state): State<AppState>,
    Path((id, change_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ActorRequest>,
) -> Result<Json<ApiResponse<MutationOutcome>>, AppError> {
    let outcome = mutation::rollback(&state.mutation_deps(), id, change_id, body.actor).await?;
    Ok(ApiResponse::success(outcome))
}
