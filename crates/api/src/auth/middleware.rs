//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::header::{AUTHORIZATION, COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use uuid::Uuid;

use super::jwt::{JwtError, JwtManager};
use crate::error::ApiError;

/// Cookie set by the web app for same-site dashboard requests
const AUTH_COOKIE: &str = "bizreport_auth_token";

/// Role allowed to reach the admin routes
pub const PLATFORM_ADMIN_ROLE: &str = "admin";

/// Authenticated caller extracted from the bearer token
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
    pub email: Option<String>,
}

impl AuthUser {
    pub fn is_platform_admin(&self) -> bool {
        self.role == PLATFORM_ADMIN_ROLE
    }

    pub fn require_platform_admin(&self) -> Result<(), AuthError> {
        if self.is_platform_admin() {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermissions)
        }
    }
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

fn extract_token_from_cookie(request: &Request) -> Option<String> {
    let prefix = format!("{}=", AUTH_COOKIE);
    request
        .headers()
        .get(COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .map(str::trim)
                .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))
                .map(String::from)
        })
}

/// Extract bearer token from Authorization header or cookie.
/// The header wins when both are present.
pub(crate) fn extract_bearer_token(request: &Request) -> Option<String> {
    if let Some(header) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    extract_token_from_cookie(request)
}

fn authenticate_jwt(auth_state: &AuthState, token: &str) -> Result<AuthUser, AuthError> {
    let claims = auth_state
        .jwt_manager
        .validate_access_token(token)
        .map_err(|e| {
            match e {
                JwtError::Expired => tracing::debug!("authenticate_jwt: token expired"),
                other => tracing::debug!(error = %other, "authenticate_jwt: token rejected"),
            }
            AuthError::InvalidToken
        })?;

    Ok(AuthUser {
        user_id: claims.sub,
        role: claims.role,
        email: Some(claims.email).filter(|e| !e.is_empty()),
    })
}

/// Middleware that requires authentication
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let auth_result = match extract_bearer_token(&request) {
        Some(token) => authenticate_jwt(&auth_state, &token),
        None => Err(AuthError::MissingAuth),
    };

    match auth_result {
        Ok(auth_user) => {
            tracing::debug!(
                path = %path,
                user_id = %auth_user.user_id,
                role = %auth_user.role,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, error = ?err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

/// Middleware that authenticates when it can and otherwise lets the request
/// through without an `AuthUser`; handlers decide what anonymity means
pub async fn optional_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_bearer_token(&request) {
        if let Ok(auth_user) = authenticate_jwt(&auth_state, &token) {
            request.extensions_mut().insert(auth_user);
        }
    }

    next.run(request).await
}
