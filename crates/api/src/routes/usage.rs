//! Usage limit and tier catalog routes

use axum::{
    extract::{Extension, State},
    Json,
};
use bizreport_billing::{LimitSnapshot, Tier};
use serde::Serialize;

use crate::{auth::AuthUser, state::AppState};

#[derive(Debug, Serialize)]
pub struct TierView {
    pub id: String,
    pub name: String,
    pub price_monthly_cents: Option<i64>,
    /// -1 for unlimited
    pub report_limit: i64,
}

impl From<&Tier> for TierView {
    fn from(tier: &Tier) -> Self {
        Self {
            id: tier.id.clone(),
            name: tier.name.clone(),
            price_monthly_cents: tier.price_monthly_cents,
            report_limit: tier.report_limit.to_wire(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TierListResponse {
    pub tiers: Vec<TierView>,
}

/// Limit, count and tier for the caller's team.
///
/// Never fails: any problem (including an anonymous caller) yields free-tier
/// values labelled "Error" so the UI can still render.
pub async fn get_limit(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
) -> Json<LimitSnapshot> {
    let fallback = || LimitSnapshot::error_fallback(state.tiers().free());

    let Some(Extension(user)) = auth_user else {
        return Json(fallback());
    };

    let team = match state.store.team_for_user(user.user_id).await {
        Ok(Some(team)) => team,
        Ok(None) => {
            tracing::warn!(user_id = %user.user_id, "Limit check for user without a team");
            return Json(fallback());
        }
        Err(e) => {
            tracing::error!(user_id = %user.user_id, error = %e, "Limit check team lookup failed");
            return Json(fallback());
        }
    };

    match state.billing.ledger.limit_snapshot(team.id).await {
        Ok(snapshot) => Json(snapshot),
        Err(e) => {
            tracing::error!(team_id = %team.id, error = %e, "Limit check failed");
            Json(fallback())
        }
    }
}

pub async fn list_tiers(State(state): State<AppState>) -> Json<TierListResponse> {
    Json(TierListResponse {
        tiers: state.tiers().list_tiers().iter().map(TierView::from).collect(),
    })
}
