//! Platform admin routes
//!
//! Protected by the platform admin role.

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use bizreport_billing::InvariantCheckSummary;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiResult, state::AppState};

#[derive(Debug, Deserialize)]
pub struct AdjustUsageRequest {
    /// Signed delta; the counter never goes below zero
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct AdjustUsageResponse {
    pub team_id: Uuid,
    pub current_messages: i64,
}

/// Run every billing invariant check
pub async fn run_invariant_checks(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    auth_user.require_platform_admin()?;

    let summary = state.billing.invariants.run_all_checks().await?;
    tracing::info!(
        admin_id = %auth_user.user_id,
        violations = summary.violations.len(),
        healthy = summary.healthy,
        "Invariant checks run"
    );

    Ok(Json(summary))
}

/// Manually correct a team's usage counter
pub async fn adjust_team_usage(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(team_id): Path<Uuid>,
    Json(req): Json<AdjustUsageRequest>,
) -> ApiResult<Json<AdjustUsageResponse>> {
    auth_user.require_platform_admin()?;

    let current_messages = state.billing.ledger.increment(team_id, req.amount).await?;
    tracing::info!(
        admin_id = %auth_user.user_id,
        team_id = %team_id,
        amount = req.amount,
        current_messages,
        "Team usage adjusted"
    );

    Ok(Json(AdjustUsageResponse {
        team_id,
        current_messages,
    }))
}
