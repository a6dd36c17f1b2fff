//! Golden rule template routes.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::{ApiResponse, AppError};
use crate::models::golden::{CreateGoldenRule, GoldenRule};
use crate::services::golden;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GoldenRuleListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /api/v1/golden-rules - templates, active only unless asked.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<GoldenRuleListQuery>,
) -> Result<Json<ApiResponse<Vec<GoldenRule>>>, AppError> {
    let rules = golden::list_golden_rules(state.store.as_ref(), query.include_inactive).await?;
    Ok(ApiResponse::success(rules))
}

/// POST /api/v1/golden-rules - create a template.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateGoldenRule>,
) -> Result<Json<ApiResponse<GoldenRule>>, AppError> {
    let rule = golden::create_golden_rule(state.store.as_ref(), body).await?;
    Ok(ApiResponse::success(rule))
}

/// GET /api/v1/golden-rules/{id} - one template.
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<GoldenRule>>, AppError> {
    let rule = golden::get_golden_rule(state.store.as_ref(), id).await?;
    Ok(ApiResponse::success(rule))
}

/// POST /api/v1/golden-rules/{id}/deactivate - retire a template.
pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<GoldenRule>>, AppError> {
    let rule = golden::deactivate_golden_rule(state.store.as_ref(), id).await?;
    Ok(ApiResponse::success(rule))
}
