//! Chat widget token route

use axum::{
    extract::{Extension, State},
    Json,
};
use serde_json::Value;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Issue a chat widget token; the provider's JSON is passed through
pub async fn issue_chat_token(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let chat = state.chat.as_ref().ok_or(ApiError::NotConfigured("Chat"))?;

    let token = chat.issue_token().await.map_err(|e| {
        tracing::warn!(user_id = %auth_user.user_id, error = %e, "Chat token issuance failed");
        ApiError::BadGateway(e.to_string())
    })?;

    Ok(Json(token))
}
