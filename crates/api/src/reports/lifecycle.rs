//! Report lifecycle tracking
//!
//! `pending -> processing -> {completed | failed}`, with `pending -> failed`
//! for runs rejected before the workflow is called. Terminal states are
//! final: every transition is a conditional store update on the current
//! status, so a late write can never reopen a finished report.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use bizreport_shared::{DynStore, ReportRequest, ReportStatus, StoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Report not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid report transition {from} -> {to}")]
    InvalidTransition { from: ReportStatus, to: ReportStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ReportLifecycleTracker {
    store: DynStore,
}

impl ReportLifecycleTracker {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    /// Persist a new report in `pending`
    pub async fn create(
        &self,
        user_id: Uuid,
        team_id: Uuid,
        form_data: Value,
    ) -> Result<ReportRequest, LifecycleError> {
        let report = ReportRequest::new(user_id, team_id, form_data);
        self.store.insert_report(&report).await?;
        tracing::debug!(report_id = %report.id, team_id = %team_id, "Report created");
        Ok(report)
    }

    /// Move a report to `status`, optionally recording its result or error
    pub async fn update_status(
        &self,
        report_id: Uuid,
        status: ReportStatus,
        result: Option<&str>,
    ) -> Result<ReportRequest, LifecycleError> {
        let updated = self
            .store
            .transition_report(report_id, status.allowed_predecessors(), status, result)
            .await?;

        match updated {
            Some(report) => {
                tracing::debug!(report_id = %report_id, status = %status, "Report status updated");
                Ok(report)
            }
            None => {
                let current = self.get(report_id).await?;
                tracing::warn!(
                    report_id = %report_id,
                    from = %current.status,
                    to = %status,
                    "Rejected report transition"
                );
                Err(LifecycleError::InvalidTransition {
                    from: current.status,
                    to: status,
                })
            }
        }
    }

    pub async fn get(&self, report_id: Uuid) -> Result<ReportRequest, LifecycleError> {
        self.store
            .get_report(report_id)
            .await?
            .ok_or(LifecycleError::NotFound(report_id))
    }
}
