//! Recovery of interrupted reports
//!
//! The `report_requests` table doubles as the job queue: a report left in
//! `pending` or `processing` past the stale threshold lost its runner (crash,
//! deploy, dropped background task). Each cycle claims such reports one at a
//! time and hands them back to the orchestrator, which either finishes them
//! or gives up once the attempt budget is spent.

use bizreport_api::{ReportError, ReportOrchestrator};
use bizreport_shared::{DynStore, ReportStatus};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

/// Upper bound on reports resumed per cycle
pub const MAX_REPORTS_PER_CYCLE: usize = 50;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySummary {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub errors: usize,
}

/// Claim and resume stale reports until none are left or the cycle cap is hit
pub async fn recover_stale_reports(
    store: &DynStore,
    orchestrator: &ReportOrchestrator,
    stale_after: Duration,
) -> RecoverySummary {
    let mut summary = RecoverySummary::default();

    while summary.claimed < MAX_REPORTS_PER_CYCLE {
        let stale_before = OffsetDateTime::now_utc() - stale_after;
        let report = match store.claim_stale_report(stale_before).await {
            Ok(Some(report)) => report,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to claim stale report");
                summary.errors += 1;
                break;
            }
        };
        summary.claimed += 1;

        let report_id = report.id;
        match orchestrator.resume(report).await {
            Ok(report) if report.status == ReportStatus::Completed => summary.completed += 1,
            Ok(_) => summary.failed += 1,
            Err(ReportError::ExternalCallFailed { .. })
            | Err(ReportError::LimitExceeded { .. })
            | Err(ReportError::TeamNotFound) => {
                info!(report_id = %report_id, "Resumed report ended in failure");
                summary.failed += 1;
            }
            Err(e) => {
                warn!(report_id = %report_id, error = %e, "Failed to resume report");
                summary.errors += 1;
            }
        }
    }

    summary
}
