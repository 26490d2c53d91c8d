// Worker clippy configuration
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! BizReport Background Worker
//!
//! Handles scheduled jobs:
//! - Recovery of interrupted reports (every minute)
//! - Metering invariant checks (hourly)

mod recovery;

use std::sync::Arc;
use std::time::Duration;

use bizreport_api::{AppState, Config};
use bizreport_billing::InvariantCheckSummary;
use bizreport_shared::{create_pool, DynStore, PgStore};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::recovery::recover_stale_reports;

/// Log results of an invariant check run
fn log_invariant_summary(summary: &InvariantCheckSummary) {
    if summary.healthy {
        info!(checks_run = summary.checks_run, "Metering invariants healthy");
        return;
    }

    warn!(
        checks_run = summary.checks_run,
        checks_failed = summary.checks_failed,
        violations = summary.violations.len(),
        "Metering invariant violations found"
    );

    for violation in &summary.violations {
        warn!(
            invariant = %violation.invariant,
            severity = %violation.severity,
            team_ids = ?violation.team_ids,
            "{}",
            violation.description
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting BizReport Worker");

    let config = Config::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    let store: DynStore = Arc::new(PgStore::new(pool));

    // Same services the API runs, so resumed reports follow the same path
    let state = AppState::new(store.clone(), config.clone())?;
    let stale_after = time::Duration::try_from(config.stale_report_after)?;

    let scheduler = JobScheduler::new().await?;

    // Job 1: Resume reports whose runner went away
    // Cron: At second 0 of every minute
    let recovery_store = store.clone();
    let recovery_orchestrator = state.orchestrator.clone();
    scheduler
        .add(Job::new_async("0 * * * * *", move |_uuid, _l| {
            let store = recovery_store.clone();
            let orchestrator = recovery_orchestrator.clone();
            Box::pin(async move {
                let summary = recover_stale_reports(&store, &orchestrator, stale_after).await;
                if summary.claimed > 0 || summary.errors > 0 {
                    info!(
                        claimed = summary.claimed,
                        completed = summary.completed,
                        failed = summary.failed,
                        errors = summary.errors,
                        "Report recovery cycle complete"
                    );
                }
            })
        })?)
        .await?;
    info!(
        stale_after_secs = config.stale_report_after.as_secs(),
        max_attempts = config.max_report_attempts,
        "Scheduled: Report recovery (every minute)"
    );

    // Job 2: Metering invariant checks
    // Cron: At minute 0 of every hour
    let checker = state.billing.invariants.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let checker = checker.clone();
            Box::pin(async move {
                info!("Running scheduled metering invariant checks");
                match checker.run_all_checks().await {
                    Ok(summary) => log_invariant_summary(&summary),
                    Err(e) => error!(error = %e, "Invariant checks failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Metering invariant checks (hourly)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("BizReport Worker started successfully with {} scheduled jobs", 2);

    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
