//! In-memory store implementation.
//!
//! All state lives behind one async mutex, so every trait method is atomic
//! with respect to the others, mirroring the single-statement and
//! transactional guarantees of the PostgreSQL backend.
//!
//! This implementation is suitable for:
//! - Unit and integration tests
//! - Local development without a database
//!
//! Data is lost when the process exits.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;
use crate::types::{
    ReportRequest, ReportStatus, ReservationOutcome, Team, TeamMember, WorkflowHistoryEntry,
};

#[derive(Default)]
struct Inner {
    teams: HashMap<Uuid, Team>,
    /// Memberships in join order
    members: Vec<TeamMember>,
    reports: HashMap<Uuid, ReportRequest>,
    /// Append-only, oldest first
    history: Vec<WorkflowHistoryEntry>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a team
    pub async fn insert_team(&self, team: Team) -> Team {
        let mut inner = self.inner.lock().await;
        inner.teams.insert(team.id, team.clone());
        team
    }

    pub async fn add_member(&self, team_id: Uuid, user_id: Uuid, role: &str) {
        let mut inner = self.inner.lock().await;
        inner.members.push(TeamMember {
            team_id,
            user_id,
            role: role.to_string(),
        });
    }

    /// Backdate a report's `updated_at`, as if its runner went away
    pub async fn set_report_updated_at(&self, report_id: Uuid, updated_at: OffsetDateTime) {
        let mut inner = self.inner.lock().await;
        if let Some(report) = inner.reports.get_mut(&report_id) {
            report.updated_at = updated_at;
        }
    }
}

fn is_unfinished(report: &ReportRequest) -> bool {
    matches!(
        report.status,
        ReportStatus::Pending | ReportStatus::Processing
    )
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get_team(&self, team_id: Uuid) -> StoreResult<Option<Team>> {
        let inner = self.inner.lock().await;
        Ok(inner.teams.get(&team_id).cloned())
    }

    async fn team_for_user(&self, user_id: Uuid) -> StoreResult<Option<Team>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .find_map(|m| inner.teams.get(&m.team_id).cloned()))
    }

    async fn list_teams(&self) -> StoreResult<Vec<Team>> {
        let inner = self.inner.lock().await;
        let mut teams: Vec<Team> = inner.teams.values().cloned().collect();
        teams.sort_by_key(|t| t.created_at);
        Ok(teams)
    }

    async fn increment_usage(&self, team_id: Uuid, amount: i64) -> StoreResult<Option<i64>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.teams.get_mut(&team_id).map(|team| {
            team.current_messages = team.current_messages.saturating_add(amount).max(0);
            team.updated_at = OffsetDateTime::now_utc();
            team.current_messages
        }))
    }

    async fn insert_report(&self, report: &ReportRequest) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn get_report(&self, report_id: Uuid) -> StoreResult<Option<ReportRequest>> {
        let inner = self.inner.lock().await;
        Ok(inner.reports.get(&report_id).cloned())
    }

    async fn transition_report(
        &self,
        report_id: Uuid,
        from: &[ReportStatus],
        to: ReportStatus,
        result: Option<&str>,
    ) -> StoreResult<Option<ReportRequest>> {
        let mut inner = self.inner.lock().await;
        let Some(report) = inner.reports.get_mut(&report_id) else {
            return Ok(None);
        };

        if !from.contains(&report.status) {
            return Ok(None);
        }

        report.status = to;
        if let Some(result) = result {
            report.result = Some(result.to_string());
        }
        report.updated_at = OffsetDateTime::now_utc();
        Ok(Some(report.clone()))
    }

    async fn reserve_quota(
        &self,
        report_id: Uuid,
        team_id: Uuid,
        ceiling: Option<i64>,
    ) -> StoreResult<ReservationOutcome> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let report = inner
            .reports
            .get_mut(&report_id)
            .ok_or_else(|| StoreError::NotFound(format!("report {}", report_id)))?;

        if report.quota_reserved {
            return Ok(ReservationOutcome::AlreadyReserved);
        }

        let Some(team) = inner.teams.get_mut(&team_id) else {
            return Ok(ReservationOutcome::TeamNotFound);
        };

        if let Some(ceiling) = ceiling {
            if team.current_messages >= ceiling {
                return Ok(ReservationOutcome::LimitReached {
                    current_messages: team.current_messages,
                });
            }
        }

        let now = OffsetDateTime::now_utc();
        team.current_messages += 1;
        team.updated_at = now;
        report.quota_reserved = true;
        report.updated_at = now;

        Ok(ReservationOutcome::Reserved {
            current_messages: team.current_messages,
        })
    }

    async fn release_quota(&self, report_id: Uuid) -> StoreResult<bool> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let Some(report) = inner.reports.get_mut(&report_id) else {
            return Ok(false);
        };

        if !report.quota_reserved {
            return Ok(false);
        }

        let now = OffsetDateTime::now_utc();
        report.quota_reserved = false;
        report.updated_at = now;

        if let Some(team) = inner.teams.get_mut(&report.team_id) {
            team.current_messages = (team.current_messages - 1).max(0);
            team.updated_at = now;
        }

        Ok(true)
    }

    async fn claim_stale_report(
        &self,
        stale_before: OffsetDateTime,
    ) -> StoreResult<Option<ReportRequest>> {
        let mut inner = self.inner.lock().await;

        let Some(report) = inner
            .reports
            .values_mut()
            .filter(|r| is_unfinished(r) && r.updated_at < stale_before)
            .min_by_key(|r| r.created_at)
        else {
            return Ok(None);
        };

        report.attempts += 1;
        report.updated_at = OffsetDateTime::now_utc();
        Ok(Some(report.clone()))
    }

    async fn list_stale_reports(
        &self,
        stale_before: OffsetDateTime,
    ) -> StoreResult<Vec<ReportRequest>> {
        let inner = self.inner.lock().await;
        let mut reports: Vec<ReportRequest> = inner
            .reports
            .values()
            .filter(|r| is_unfinished(r) && r.updated_at < stale_before)
            .cloned()
            .collect();
        reports.sort_by_key(|r| r.created_at);
        Ok(reports)
    }

    async fn append_history(&self, entry: &WorkflowHistoryEntry) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.history.push(entry.clone());
        Ok(())
    }

    async fn list_history(
        &self,
        team_id: Uuid,
        limit: i64,
    ) -> StoreResult<Vec<WorkflowHistoryEntry>> {
        let inner = self.inner.lock().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(0);
        Ok(inner
            .history
            .iter()
            .rev()
            .filter(|e| e.team_id == team_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
