//! Report submission and status routes

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};
use bizreport_shared::{ReportRequest, ReportStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    reports::ReportError,
    state::AppState,
};

/// Report as returned to clients. A completed report's result is sent as
/// the JSON it holds rather than as an escaped string.
#[derive(Debug, Serialize)]
pub struct ReportView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub team_id: Uuid,
    pub form_data: Value,
    pub status: ReportStatus,
    pub result: Option<Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<ReportRequest> for ReportView {
    fn from(report: ReportRequest) -> Self {
        let result = report.result.map(|text| {
            if report.status == ReportStatus::Completed {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            } else {
                Value::String(text)
            }
        });

        Self {
            id: report.id,
            user_id: report.user_id,
            team_id: report.team_id,
            form_data: report.form_data,
            status: report.status,
            result,
            created_at: report.created_at,
            updated_at: report.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitAsyncResponse {
    pub report_id: Uuid,
    pub status: ReportStatus,
}

#[derive(Debug, Deserialize)]
pub struct ReportStatusQuery {
    pub id: Option<String>,
}

/// Run a report and wait for the result
pub async fn submit_report(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    Json(form_data): Json<Value>,
) -> ApiResult<Json<ReportView>> {
    let user = auth_user.map(|Extension(user)| user);
    let report = state.orchestrator.submit(user.as_ref(), form_data).await?;
    Ok(Json(ReportView::from(report)))
}

/// Accept a report and run it in the background
pub async fn submit_report_async(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    Json(form_data): Json<Value>,
) -> ApiResult<(StatusCode, Json<SubmitAsyncResponse>)> {
    let user = auth_user.map(|Extension(user)| user);
    let report_id = state
        .orchestrator
        .submit_async(user.as_ref(), form_data)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitAsyncResponse {
            report_id,
            status: ReportStatus::Pending,
        }),
    ))
}

/// Poll a report. Reports of other teams look missing unless the caller is
/// a platform admin.
pub async fn get_report_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ReportStatusQuery>,
) -> ApiResult<Json<ReportView>> {
    let raw_id = query
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("Missing report id".to_string()))?;
    let report_id = Uuid::parse_str(raw_id.trim())
        .map_err(|_| ApiError::Validation(format!("Invalid report id '{}'", raw_id)))?;

    let report = state
        .orchestrator
        .lifecycle()
        .get(report_id)
        .await
        .map_err(ReportError::from)?;

    if !auth_user.is_platform_admin() {
        let team = state.store.team_for_user(auth_user.user_id).await?;
        if team.map(|t| t.id) != Some(report.team_id) {
            tracing::debug!(
                report_id = %report_id,
                user_id = %auth_user.user_id,
                "Report belongs to another team"
            );
            return Err(ApiError::NotFound);
        }
    }

    Ok(Json(ReportView::from(report)))
}
