//! The Store trait that backends implement.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{ReportRequest, ReportStatus, ReservationOutcome, Team, WorkflowHistoryEntry};

/// Shared handle used by services
pub type DynStore = Arc<dyn Store>;

/// Persistence for teams, report requests and workflow history.
///
/// Every method that changes a team's usage counter must do so in a single
/// atomic storage operation; callers never read-modify-write the counter.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Teams ──────────────────────────────────────────

    async fn get_team(&self, team_id: Uuid) -> StoreResult<Option<Team>>;

    /// Team the user belongs to (first membership by join date)
    async fn team_for_user(&self, user_id: Uuid) -> StoreResult<Option<Team>>;

    async fn list_teams(&self) -> StoreResult<Vec<Team>>;

    /// Atomically add `amount` to the usage counter, floored at zero.
    /// Returns the new counter, or `None` if the team does not exist.
    async fn increment_usage(&self, team_id: Uuid, amount: i64) -> StoreResult<Option<i64>>;

    // ───────────────────────────────────── Reports ────────────────────────────────────────

    async fn insert_report(&self, report: &ReportRequest) -> StoreResult<()>;

    async fn get_report(&self, report_id: Uuid) -> StoreResult<Option<ReportRequest>>;

    /// Move a report to `to` only if its current status is one of `from`.
    /// `result`, when given, replaces the stored result.
    /// Returns the updated report, or `None` if the report is missing or its
    /// status did not match.
    async fn transition_report(
        &self,
        report_id: Uuid,
        from: &[ReportStatus],
        to: ReportStatus,
        result: Option<&str>,
    ) -> StoreResult<Option<ReportRequest>>;

    /// Add one unit to the team counter if it is below `ceiling` (no ceiling
    /// means unlimited) and mark the report as holding it, as one operation.
    /// Idempotent per report.
    async fn reserve_quota(
        &self,
        report_id: Uuid,
        team_id: Uuid,
        ceiling: Option<i64>,
    ) -> StoreResult<ReservationOutcome>;

    /// Give back the unit held by the report, if any. Returns whether a unit
    /// was released.
    async fn release_quota(&self, report_id: Uuid) -> StoreResult<bool>;

    /// Claim the oldest unfinished report not touched since `stale_before`,
    /// bumping its attempt count so no other runner picks it up.
    async fn claim_stale_report(
        &self,
        stale_before: OffsetDateTime,
    ) -> StoreResult<Option<ReportRequest>>;

    /// Unfinished reports not touched since `stale_before` (read-only)
    async fn list_stale_reports(
        &self,
        stale_before: OffsetDateTime,
    ) -> StoreResult<Vec<ReportRequest>>;

    // ───────────────────────────────────── History ────────────────────────────────────────

    async fn append_history(&self, entry: &WorkflowHistoryEntry) -> StoreResult<()>;

    /// Most recent entries first
    async fn list_history(
        &self,
        team_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowHistoryEntry>>;
}
