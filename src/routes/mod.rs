//! Route definitions for the nsguard API.

use axum::routing::{get, post, put};
use axum::Router;

use crate::AppState;

pub mod backups;
pub mod changes;
pub mod golden_rules;
pub mod groups;
pub mod health;

/// Builds the full API router. The caller attaches state and middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/api/v1/nsgs", get(groups::list))
        .route(
            "/api/v1/nsgs/{id}",
            get(groups::get_by_id).delete(groups::delete),
        )
        .route("/api/v1/nsgs/{id}/rules", put(groups::update_rules))
        .route(
            "/api/v1/nsgs/{id}/compliance/{golden_rule_id}",
            post(groups::score_compliance),
        )
        .route("/api/v1/nsgs/{id}/changes", get(changes::list))
        .route(
            "/api/v1/nsgs/{id}/changes/{change_id}/rollback",
            post(changes::rollback),
        )
        .route(
            "/api/v1/nsgs/{id}/backups",
            get(backups::list).post(backups::create),
        )
        .route(
            "/api/v1/nsgs/{id}/backups/{backup_id}/restore",
            post(backups::restore),
        )
        .route(
            "/api/v1/golden-rules",
            get(golden_rules::list).post(golden_rules::create),
        )
        .route("/api/v1/golden-rules/{id}", get(golden_rules::get_by_id))
        .route(
            "/api/v1/golden-rules/{id}/deactivate",
            post(golden_rules::deactivate),
        )
}
