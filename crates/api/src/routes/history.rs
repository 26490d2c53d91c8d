//! Workflow history route

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use bizreport_shared::WorkflowHistoryEntry;
use serde::{Deserialize, Serialize};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<WorkflowHistoryEntry>,
}

/// Most recent successful runs for the caller's team, newest first
pub async fn get_history(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let team = state
        .store
        .team_for_user(auth_user.user_id)
        .await?
        .ok_or(ApiError::TeamNotFound)?;

    let entries = state
        .orchestrator
        .history()
        .get(team.id, query.limit)
        .await?;

    Ok(Json(HistoryResponse { entries }))
}
