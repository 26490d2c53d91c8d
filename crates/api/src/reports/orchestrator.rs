//! Report orchestration
//!
//! One "run a report" use case, end to end:
//!
//! 1. Authenticate and resolve the caller's team
//! 2. Pre-check the quota (rejection has no side effects)
//! 3. Create the report and reserve one unit of quota for it
//! 4. Call the workflow
//! 5. Settle: `completed` keeps the reservation, `failed` releases it
//! 6. Append history
//!
//! The reservation is a single conditional update keyed by report id, so two
//! concurrent submissions can never both take the last unit, and re-running
//! an interrupted report never charges it twice.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use bizreport_billing::{BillingError, Limit, QuotaLedger};
use bizreport_shared::{DynStore, ReportRequest, ReportStatus, ReservationOutcome, StoreError};

use super::history::HistoryRecorder;
use super::lifecycle::{LifecycleError, ReportLifecycleTracker};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::workflow::{WorkflowClient, WorkflowError};

/// Result text stored on a report rejected by a lost reservation race
const LIMIT_EXCEEDED_DETAIL: &str = "limit exceeded";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Team not found")]
    TeamNotFound,

    #[error("Report not found: {0}")]
    ReportNotFound(Uuid),

    #[error("Report limit reached on the {tier} plan ({used}/{limit})")]
    LimitExceeded {
        tier: String,
        limit: Limit,
        used: i64,
        upgrade_url: String,
    },

    #[error("Workflow call failed for report {report_id}: {source}")]
    ExternalCallFailed {
        report_id: Uuid,
        #[source]
        source: WorkflowError,
    },

    #[error("Usage update failed: {0}")]
    IncrementFailed(String),

    #[error(transparent)]
    Lifecycle(LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LifecycleError> for ReportError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::NotFound(id) => ReportError::ReportNotFound(id),
            other => ReportError::Lifecycle(other),
        }
    }
}

impl From<BillingError> for ReportError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::TeamNotFound(_) => ReportError::TeamNotFound,
            other => ReportError::IncrementFailed(other.to_string()),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(e: ReportError) -> Self {
        match e {
            ReportError::Unauthenticated => ApiError::Unauthorized,
            ReportError::TeamNotFound => ApiError::TeamNotFound,
            ReportError::ReportNotFound(_) => ApiError::NotFound,
            ReportError::LimitExceeded {
                tier,
                limit,
                used,
                upgrade_url,
            } => ApiError::LimitExceeded {
                message: format!(
                    "You've used {} of {} reports on the {} plan. Upgrade your plan to run more reports.",
                    used, limit, tier
                ),
                upgrade_url: Some(upgrade_url),
            },
            ReportError::ExternalCallFailed { .. } => ApiError::ExternalCallFailed,
            other => ApiError::Database(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct ReportOrchestrator {
    store: DynStore,
    ledger: QuotaLedger,
    lifecycle: ReportLifecycleTracker,
    history: HistoryRecorder,
    workflow: WorkflowClient,
    upgrade_url: String,
    max_attempts: i32,
}

impl ReportOrchestrator {
    pub fn new(
        store: DynStore,
        ledger: QuotaLedger,
        workflow: WorkflowClient,
        upgrade_url: String,
        max_attempts: i32,
    ) -> Self {
        Self {
            lifecycle: ReportLifecycleTracker::new(store.clone()),
            history: HistoryRecorder::new(store.clone()),
            store,
            ledger,
            workflow,
            upgrade_url,
            max_attempts,
        }
    }

    pub fn lifecycle(&self) -> &ReportLifecycleTracker {
        &self.lifecycle
    }

    pub fn history(&self) -> &HistoryRecorder {
        &self.history
    }

    /// Run a report and wait for the outcome
    pub async fn submit(
        &self,
        user: Option<&AuthUser>,
        form_data: Value,
    ) -> Result<ReportRequest, ReportError> {
        let report = self.admit(user, form_data).await?;
        self.execute(report).await
    }

    /// Admit a report and run it in the background. Auth, team and limit
    /// errors are returned here; the returned report id is `pending`.
    pub async fn submit_async(
        &self,
        user: Option<&AuthUser>,
        form_data: Value,
    ) -> Result<Uuid, ReportError> {
        let report = self.admit(user, form_data).await?;
        let report_id = report.id;

        let orchestrator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.execute(report).await {
                tracing::warn!(report_id = %report_id, error = %e, "Background report run failed");
            }
        });

        Ok(report_id)
    }

    /// Continue a report whose runner went away. Safe to call more than once
    /// for the same report: the reservation is keyed by report id.
    pub async fn resume(&self, report: ReportRequest) -> Result<ReportRequest, ReportError> {
        if report.attempts > self.max_attempts {
            tracing::warn!(
                report_id = %report.id,
                attempts = report.attempts,
                "Giving up on report after too many attempts"
            );
            let detail = format!("abandoned after {} attempts", report.attempts);
            return self.fail(&report, &detail).await;
        }

        tracing::info!(
            report_id = %report.id,
            status = %report.status,
            attempts = report.attempts,
            "Resuming interrupted report"
        );

        if !report.quota_reserved {
            self.reserve(&report).await?;
        }
        self.execute(report).await
    }

    /// Auth, team, limit pre-check, creation and reservation
    async fn admit(
        &self,
        user: Option<&AuthUser>,
        form_data: Value,
    ) -> Result<ReportRequest, ReportError> {
        let user = user.ok_or(ReportError::Unauthenticated)?;

        let team = self
            .store
            .team_for_user(user.user_id)
            .await?
            .ok_or(ReportError::TeamNotFound)?;

        let quota = self.ledger.check_remaining(team.id).await?;
        if !quota.within_limit {
            tracing::info!(
                team_id = %team.id,
                tier = %quota.tier.id,
                used = quota.used,
                "Report rejected, limit exceeded"
            );
            return Err(self.limit_exceeded(quota.tier.name, quota.tier.report_limit, quota.used));
        }

        let report = self
            .lifecycle
            .create(user.user_id, team.id, form_data)
            .await?;
        self.reserve(&report).await?;
        Ok(report)
    }

    /// Take the report's unit of quota, failing the report if that is not
    /// possible
    async fn reserve(&self, report: &ReportRequest) -> Result<(), ReportError> {
        match self.ledger.reserve(report).await {
            Ok(ReservationOutcome::Reserved { .. }) | Ok(ReservationOutcome::AlreadyReserved) => {
                Ok(())
            }
            Ok(ReservationOutcome::LimitReached { current_messages }) => {
                self.mark_failed(report.id, LIMIT_EXCEEDED_DETAIL).await;
                let quota = self.ledger.check_remaining(report.team_id).await?;
                Err(self.limit_exceeded(
                    quota.tier.name,
                    quota.tier.report_limit,
                    current_messages,
                ))
            }
            Ok(ReservationOutcome::TeamNotFound) => {
                self.mark_failed(report.id, "team not found").await;
                Err(ReportError::TeamNotFound)
            }
            Err(e) => {
                tracing::error!(report_id = %report.id, error = %e, "Quota reservation failed");
                self.mark_failed(report.id, "usage reservation failed").await;
                Err(ReportError::IncrementFailed(e.to_string()))
            }
        }
    }

    /// Processing, workflow call and settlement for an admitted report
    async fn execute(&self, report: ReportRequest) -> Result<ReportRequest, ReportError> {
        match self
            .lifecycle
            .update_status(report.id, ReportStatus::Processing, None)
            .await
        {
            Ok(_) => {}
            Err(LifecycleError::InvalidTransition { from, .. }) if from.is_terminal() => {
                return self.settled_elsewhere(report.id).await;
            }
            Err(e) => return Err(e.into()),
        }

        match self.workflow.run(&report.form_data).await {
            Err(source) => {
                tracing::warn!(report_id = %report.id, error = %source, "Workflow call failed");
                let detail = source.detail();
                match self
                    .lifecycle
                    .update_status(report.id, ReportStatus::Failed, Some(&detail))
                    .await
                {
                    Ok(_) => self.release(report.id).await,
                    Err(LifecycleError::InvalidTransition { from, .. }) if from.is_terminal() => {
                        // An overlapping run already settled it, reservation included
                        return self.settled_elsewhere(report.id).await;
                    }
                    // Still unfinished with its reservation; recovery settles it
                    Err(e) => {
                        tracing::error!(report_id = %report.id, error = %e, "Failed to mark report failed")
                    }
                }
                Err(ReportError::ExternalCallFailed {
                    report_id: report.id,
                    source,
                })
            }
            Ok(output) => {
                let output = output.into_value();
                let completed = match self
                    .lifecycle
                    .update_status(report.id, ReportStatus::Completed, Some(&output.to_string()))
                    .await
                {
                    Ok(completed) => completed,
                    Err(LifecycleError::InvalidTransition { from, .. }) if from.is_terminal() => {
                        // The overlapping run owns history for this report
                        return self.settled_elsewhere(report.id).await;
                    }
                    Err(e) => return Err(e.into()),
                };

                tracing::info!(
                    report_id = %report.id,
                    team_id = %report.team_id,
                    "Report completed"
                );

                if let Err(e) = self
                    .history
                    .append(report.team_id, report.user_id, report.form_data, output)
                    .await
                {
                    tracing::error!(report_id = %report.id, error = %e, "Failed to append workflow history");
                }

                Ok(completed)
            }
        }
    }

    /// Current state of a report another runner already finished
    async fn settled_elsewhere(&self, report_id: Uuid) -> Result<ReportRequest, ReportError> {
        let report = self.lifecycle.get(report_id).await?;
        tracing::info!(
            report_id = %report_id,
            status = %report.status,
            "Report already settled by another runner"
        );
        Ok(report)
    }

    async fn fail(&self, report: &ReportRequest, detail: &str) -> Result<ReportRequest, ReportError> {
        let failed = self
            .lifecycle
            .update_status(report.id, ReportStatus::Failed, Some(detail))
            .await?;
        self.release(report.id).await;
        Ok(failed)
    }

    /// Best-effort failure marking on paths that already return an error
    async fn mark_failed(&self, report_id: Uuid, detail: &str) {
        if let Err(e) = self
            .lifecycle
            .update_status(report_id, ReportStatus::Failed, Some(detail))
            .await
        {
            tracing::error!(report_id = %report_id, error = %e, "Failed to mark report failed");
        }
    }

    async fn release(&self, report_id: Uuid) {
        if let Err(e) = self.ledger.release(report_id).await {
            tracing::error!(report_id = %report_id, error = %e, "Failed to release quota reservation");
        }
    }

    fn limit_exceeded(&self, tier: String, limit: Limit, used: i64) -> ReportError {
        ReportError::LimitExceeded {
            tier,
            limit,
            used,
            upgrade_url: self.upgrade_url.clone(),
        }
    }
}
