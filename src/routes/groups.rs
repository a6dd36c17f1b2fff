//! Security group routes: sync-on-read listing, rule mutation, compliance.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::{ApiResponse, AppError};
use crate::models::group::{GroupFilter, SecurityGroup};
use crate::models::pagination::{PagedResult, Pagination};
use crate::models::rule::RuleInput;
use crate::services::compliance::{self, ComplianceAnalysis};
use crate::services::mutation::{self, MutationOutcome};
use crate::services::sync;
use crate::AppState;

/// Rule replacement payload. The whole rule set is submitted at once.
#[derive(Debug, Deserialize)]
pub struct UpdateRules {
    pub actor: String,
    pub rules: Vec<RuleInput>,
}

/// GET /api/v1/nsgs - reconcile with the authority, then list the mirror.
pub async fn list(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    Query(filter): Query<GroupFilter>,
) -> Result<Json<ApiResponse<PagedResult<SecurityGroup>>>, AppError> {
    let result = sync::reconcile_and_list(
        state.store.as_ref(),
        state.cloud.as_ref(),
        &filter,
        &pagination,
    )
    .await?;
    Ok(ApiResponse::success(result))
}

/// GET /api/v1/nsgs/{id} - one group, refreshed from the authority.
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SecurityGroup>>, AppError> {
    let group = sync::get_group_synced(state.store.as_ref(), state.cloud.as_ref(), id).await?;
    Ok(ApiResponse::success(group))
}

/// DELETE /api/v1/nsgs/{id} - forget the mirror row. The authority copy is
/// untouched.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Uuid>>, AppError> {
    sync::delete_group(state.store.as_ref(), id).await?;
    Ok(ApiResponse::success(id))
}

/// PUT /api/v1/nsgs/{id}/rules - replace the rule set, authority first.
pub async fn update_rules(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateRules>,
) -> Result<Json<ApiResponse<MutationOutcome>>, AppError> {
    let outcome =
        mutation::mutate_rules(&state.mutation_deps(), id, body.rules, body.actor).await?;
    Ok(ApiResponse::success(outcome))
}

/// POST /api/v1/nsgs/{id}/compliance/{golden_rule_id} - score the group
/// against a template and persist the result.
pub async fn score_compliance(
    State(state): State<AppState>,
    Path((id, golden_rule_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiResponse<ComplianceAnalysis>>, AppError> {
    let analysis =
        compliance::score_compliance(state.store.as_ref(), id, golden_rule_id, &state.weights)
            .await?;
    Ok(ApiResponse::success(analysis))
}
