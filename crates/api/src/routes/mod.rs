//! HTTP routes

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{
    auth::{optional_auth, require_auth},
    state::AppState,
};

pub mod admin;
pub mod chat;
pub mod history;
pub mod reports;
pub mod usage;


/// Build the API router.
///
/// - Public: health, tier catalog
/// - Optional auth: report submission and the limit check, which handle
///   anonymous callers themselves
/// - Required auth: everything else
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/api/v1/tiers", get(usage::list_tiers));

    let optional = Router::new()
        .route("/api/v1/reports", post(reports::submit_report))
        .route("/api/v1/reports/async", post(reports::submit_report_async))
        .route("/api/v1/usage/limit", get(usage::get_limit))
        .route_layer(middleware::from_fn_with_state(
            state.auth_state(),
            optional_auth,
        ));

    let protected = Router::new()
        .route("/api/v1/reports/status", get(reports::get_report_status))
        .route("/api/v1/history", get(history::get_history))
        .route("/api/v1/chat/token", post(chat::issue_chat_token))
        .route("/api/v1/admin/invariants", get(admin::run_invariant_checks))
        .route(
            "/api/v1/admin/teams/{team_id}/usage",
            post(admin::adjust_team_usage),
        )
        .route_layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(optional)
        .merge(protected)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
