//! Domain records persisted by the store

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StoreError;

/// A team and its metering state.
///
/// Both billing fields null means the team is on the free tier.
/// `message_limit` is a cached snapshot only; the live tier resolved from the
/// registry is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub subscription_id: Option<String>,
    pub billing_product_reference: Option<String>,
    pub current_messages: i64,
    pub message_limit: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Team {
    /// New team on the free tier with a zeroed counter
    pub fn new(name: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            subscription_id: None,
            billing_product_reference: None,
            current_messages: 0,
            message_limit: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach external billing identifiers (as a billing webhook would)
    pub fn with_subscription(
        mut self,
        subscription_id: impl Into<String>,
        product_reference: impl Into<String>,
    ) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self.billing_product_reference = Some(product_reference.into());
        self
    }

    pub fn with_usage(mut self, current_messages: i64) -> Self {
        self.current_messages = current_messages;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TeamMember {
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
}

/// Status of a report request.
///
/// `Pending -> Processing -> {Completed | Failed}`, plus `Pending -> Failed`
/// when the run is rejected before any external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Processing => "processing",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }

    /// States a report may be in immediately before moving to `self`
    pub fn allowed_predecessors(&self) -> &'static [ReportStatus] {
        match self {
            ReportStatus::Pending => &[],
            ReportStatus::Processing => &[ReportStatus::Pending, ReportStatus::Processing],
            ReportStatus::Completed => &[ReportStatus::Processing],
            ReportStatus::Failed => &[ReportStatus::Pending, ReportStatus::Processing],
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "processing" => Ok(ReportStatus::Processing),
            "completed" => Ok(ReportStatus::Completed),
            "failed" => Ok(ReportStatus::Failed),
            other => Err(StoreError::Decode(format!("unknown report status '{}'", other))),
        }
    }
}

/// One "run a report" request and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub team_id: Uuid,
    pub form_data: serde_json::Value,
    pub status: ReportStatus,
    /// Success payload or error detail, set on the terminal transition
    pub result: Option<String>,
    /// Whether one unit of the team's usage counter is held by this report
    pub quota_reserved: bool,
    /// Number of runners that have claimed this report
    pub attempts: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ReportRequest {
    pub fn new(user_id: Uuid, team_id: Uuid, form_data: serde_json::Value) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            user_id,
            team_id,
            form_data,
            status: ReportStatus::Pending,
            result: None,
            quota_reserved: false,
            attempts: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Append-only record of a successful workflow call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowHistoryEntry {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl WorkflowHistoryEntry {
    pub fn new(
        team_id: Uuid,
        user_id: Uuid,
        input: serde_json::Value,
        output: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id,
            user_id,
            input,
            output,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Result of a conditional usage reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// Counter incremented, report now holds one unit
    Reserved { current_messages: i64 },
    /// Report already held a unit; nothing changed
    AlreadyReserved,
    /// Counter is at or above the ceiling; nothing changed
    LimitReached { current_messages: i64 },
    TeamNotFound,
}
