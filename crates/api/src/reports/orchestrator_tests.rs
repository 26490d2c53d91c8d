//! End-to-end tests for report orchestration
//!
//! Runs the orchestrator against the in-memory store and a mock workflow
//! server:
//! - Free-tier happy path, second submission blocked
//! - Workflow failure and plain-text responses
//! - Concurrent submissions racing for the last unit
//! - Background submission and recovery of interrupted reports

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use bizreport_billing::{BillingService, PriceIds, TierRegistry};
use bizreport_shared::{MemoryStore, ReportRequest, ReportStatus, Store, Team};
use serde_json::{json, Value};
use uuid::Uuid;

use super::orchestrator::{ReportError, ReportOrchestrator};
use crate::auth::AuthUser;
use crate::workflow::{WorkflowClient, WorkflowError};

const UPGRADE_URL: &str = "http://localhost:3000/pricing";

struct Harness {
    store: MemoryStore,
    orchestrator: ReportOrchestrator,
    team: Team,
    user: AuthUser,
}

impl Harness {
    async fn team_usage(&self) -> i64 {
        self.store
            .get_team(self.team.id)
            .await
            .unwrap()
            .unwrap()
            .current_messages
    }

    async fn history_len(&self) -> usize {
        self.store.list_history(self.team.id, 100).await.unwrap().len()
    }
}

async fn harness(server: &mockito::Server, team: Team) -> Harness {
    harness_with_timeout(server, team, Duration::from_secs(5)).await
}

async fn harness_with_timeout(
    server: &mockito::Server,
    team: Team,
    workflow_timeout: Duration,
) -> Harness {
    let store = MemoryStore::new();
    let team = store.insert_team(team).await;
    let user_id = Uuid::new_v4();
    store.add_member(team.id, user_id, "owner").await;

    let tiers = TierRegistry::with_prices(&PriceIds {
        founder: "price_founder".to_string(),
        pro: "price_pro".to_string(),
    })
    .unwrap();
    let billing = BillingService::new(
        Arc::new(store.clone()),
        tiers,
        time::Duration::minutes(15),
    );
    let workflow = WorkflowClient::new(
        &format!("{}/run", server.url()),
        "wf-key",
        workflow_timeout,
    )
    .unwrap();

    let orchestrator = ReportOrchestrator::new(
        Arc::new(store.clone()),
        billing.ledger.clone(),
        workflow,
        UPGRADE_URL.to_string(),
        3,
    );

    Harness {
        store,
        orchestrator,
        team,
        user: AuthUser {
            user_id,
            role: "member".to_string(),
            email: Some("owner@example.com".to_string()),
        },
    }
}

// =========================================================================
// Scenario A + B: free tier, one report allowed, second one blocked
// =========================================================================
#[tokio::test]
async fn test_free_tier_runs_once_then_blocks() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/run")
        .match_header("authorization", "Bearer wf-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"summary":"Solid business"}"#)
        .expect(1)
        .create_async()
        .await;
    let h = harness(&server, Team::new("Acme")).await;

    let report = h
        .orchestrator
        .submit(Some(&h.user), json!({ "company": "Acme" }))
        .await
        .unwrap();

    assert_eq!(report.status, ReportStatus::Completed);
    let result: Value = serde_json::from_str(report.result.as_deref().unwrap()).unwrap();
    assert_eq!(result["summary"], "Solid business");
    assert_eq!(h.team_usage().await, 1);
    assert_eq!(h.history_len().await, 1);

    let err = h
        .orchestrator
        .submit(Some(&h.user), json!({ "company": "Acme" }))
        .await
        .unwrap_err();

    match err {
        ReportError::LimitExceeded {
            used, upgrade_url, ..
        } => {
            assert_eq!(used, 1);
            assert_eq!(upgrade_url, UPGRADE_URL);
        }
        other => panic!("expected LimitExceeded, got {:?}", other),
    }
    assert_eq!(h.team_usage().await, 1);
    assert_eq!(h.history_len().await, 1);
    mock.assert_async().await;
}

// =========================================================================
// Scenario C: workflow returns 500 - report failed, nothing charged
// =========================================================================
#[tokio::test]
async fn test_workflow_failure_marks_report_failed() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/run")
        .with_status(500)
        .with_body("server error")
        .create_async()
        .await;
    let h = harness(&server, Team::new("Acme")).await;

    let err = h
        .orchestrator
        .submit(Some(&h.user), json!({ "company": "Acme" }))
        .await
        .unwrap_err();

    let ReportError::ExternalCallFailed { report_id, .. } = err else {
        panic!("expected ExternalCallFailed, got {:?}", err);
    };
    let report = h.orchestrator.lifecycle().get(report_id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Failed);
    assert_eq!(report.result.as_deref(), Some("server error"));
    assert!(!report.quota_reserved);
    assert_eq!(h.team_usage().await, 0);
    assert_eq!(h.history_len().await, 0);
}

#[tokio::test]
async fn test_workflow_timeout_marks_report_failed() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/run")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_millis(1500));
            w.write_all(br#"{"summary":"late"}"#)
        })
        .create_async()
        .await;
    let h = harness_with_timeout(&server, Team::new("Acme"), Duration::from_millis(200)).await;

    let err = h
        .orchestrator
        .submit(Some(&h.user), json!({ "company": "Acme" }))
        .await
        .unwrap_err();

    let report_id = match err {
        ReportError::ExternalCallFailed {
            report_id,
            source: WorkflowError::Timeout,
        } => report_id,
        other => panic!("expected a timed-out workflow call, got {:?}", other),
    };

    let report = h.orchestrator.lifecycle().get(report_id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Failed);
    assert!(!report.quota_reserved);
    assert_eq!(h.team_usage().await, 0);
    assert_eq!(h.history_len().await, 0);
}

// =========================================================================
// Scenario D: plain-text body is wrapped, never an error
// =========================================================================
#[tokio::test]
async fn test_plain_text_result_is_wrapped() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/run")
        .with_status(200)
        .with_header("content-type", "text/markdown")
        .with_body("# Report\nRevenue is growing.")
        .create_async()
        .await;
    let h = harness(&server, Team::new("Acme")).await;

    let report = h
        .orchestrator
        .submit(Some(&h.user), json!({ "company": "Acme" }))
        .await
        .unwrap();

    assert_eq!(report.status, ReportStatus::Completed);
    let result: Value = serde_json::from_str(report.result.as_deref().unwrap()).unwrap();
    assert_eq!(
        result,
        json!({ "result": "# Report\nRevenue is growing.", "success": true })
    );

    let history = h.store.list_history(h.team.id, 10).await.unwrap();
    assert_eq!(history[0].output, result);
    assert_eq!(history[0].input, json!({ "company": "Acme" }));
}

#[tokio::test]
async fn test_anonymous_caller_is_rejected() {
    let server = mockito::Server::new_async().await;
    let h = harness(&server, Team::new("Acme")).await;

    let err = h.orchestrator.submit(None, json!({})).await.unwrap_err();
    assert!(matches!(err, ReportError::Unauthenticated));
}

#[tokio::test]
async fn test_caller_without_team_is_rejected() {
    let server = mockito::Server::new_async().await;
    let h = harness(&server, Team::new("Acme")).await;
    let outsider = AuthUser {
        user_id: Uuid::new_v4(),
        role: "member".to_string(),
        email: None,
    };

    let err = h
        .orchestrator
        .submit(Some(&outsider), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::TeamNotFound));
}

// =========================================================================
// 6 concurrent submissions at 24/25 - exactly one reaches the workflow
// =========================================================================
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_submissions_take_last_unit_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/run")
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .expect(1)
        .create_async()
        .await;
    let h = harness(
        &server,
        Team::new("Founder Co")
            .with_subscription("sub_1", "price_founder")
            .with_usage(24),
    )
    .await;

    let mut handles = vec![];
    for _ in 0..6 {
        let orchestrator = h.orchestrator.clone();
        let user = h.user.clone();
        handles.push(tokio::spawn(async move {
            orchestrator.submit(Some(&user), json!({})).await
        }));
    }

    let mut completed = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(report) => {
                assert_eq!(report.status, ReportStatus::Completed);
                completed += 1;
            }
            Err(ReportError::LimitExceeded { .. }) => limited += 1,
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    assert_eq!(completed, 1);
    assert_eq!(limited, 5);
    assert_eq!(h.team_usage().await, 25);
    mock.assert_async().await;
}

// =========================================================================
// Background submission - returns pending id, completes later
// =========================================================================
#[tokio::test]
async fn test_async_submission_completes_in_background() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/run")
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .create_async()
        .await;
    let h = harness(&server, Team::new("Acme")).await;

    let report_id = h
        .orchestrator
        .submit_async(Some(&h.user), json!({ "company": "Acme" }))
        .await
        .unwrap();

    let mut report = h.orchestrator.lifecycle().get(report_id).await.unwrap();
    for _ in 0..100 {
        if report.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        report = h.orchestrator.lifecycle().get(report_id).await.unwrap();
    }

    assert_eq!(report.status, ReportStatus::Completed);
    assert_eq!(h.team_usage().await, 1);
}

#[tokio::test]
async fn test_async_submission_reports_limit_inline() {
    let server = mockito::Server::new_async().await;
    let h = harness(&server, Team::new("Acme").with_usage(1)).await;

    let err = h
        .orchestrator
        .submit_async(Some(&h.user), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::LimitExceeded { .. }));
}

// =========================================================================
// Interrupted report resumed twice - one workflow call, charged once
// =========================================================================
#[tokio::test]
async fn test_resumed_report_is_charged_once() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/run")
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .expect(1)
        .create_async()
        .await;
    let h = harness(&server, Team::new("Acme")).await;

    // Runner died right after creating the report
    let report = ReportRequest::new(h.user.user_id, h.team.id, json!({ "company": "Acme" }));
    h.store.insert_report(&report).await.unwrap();

    let first = h.orchestrator.resume(report.clone()).await.unwrap();
    assert_eq!(first.status, ReportStatus::Completed);

    // A second runner holding the stale snapshot
    let second = h.orchestrator.resume(report).await.unwrap();
    assert_eq!(second.status, ReportStatus::Completed);

    assert_eq!(h.team_usage().await, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_resume_gives_up_after_max_attempts() {
    let server = mockito::Server::new_async().await;
    let h = harness(&server, Team::new("Acme")).await;

    let mut report = ReportRequest::new(h.user.user_id, h.team.id, json!({}));
    h.store.insert_report(&report).await.unwrap();
    h.store
        .reserve_quota(report.id, h.team.id, Some(1))
        .await
        .unwrap();
    assert_eq!(h.team_usage().await, 1);

    report.attempts = 4;
    let failed = h.orchestrator.resume(report).await.unwrap();

    assert_eq!(failed.status, ReportStatus::Failed);
    assert_eq!(failed.result.as_deref(), Some("abandoned after 4 attempts"));
    assert_eq!(h.team_usage().await, 0);
}

// =========================================================================
// Recovery overlapping a live run - both settle to the completed report
// =========================================================================
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_runs_both_return_completed() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/run")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_millis(400));
            w.write_all(br#"{"ok":true}"#)
        })
        .create_async()
        .await;
    let h = harness(&server, Team::new("Acme")).await;

    let orchestrator = h.orchestrator.clone();
    let user = h.user.clone();
    let live = tokio::spawn(async move {
        orchestrator.submit(Some(&user), json!({ "company": "Acme" })).await
    });

    // Wait for the live run to be waiting on the workflow
    let far_future = time::OffsetDateTime::now_utc() + time::Duration::hours(1);
    let mut in_flight = None;
    for _ in 0..100 {
        let stale = h.store.list_stale_reports(far_future).await.unwrap();
        if let Some(report) = stale
            .into_iter()
            .find(|r| r.status == ReportStatus::Processing)
        {
            in_flight = Some(report);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let in_flight = in_flight.expect("live run never reached processing");

    let claimed = h
        .store
        .claim_stale_report(far_future)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, in_flight.id);
    let resumed = h.orchestrator.resume(claimed).await.unwrap();
    let submitted = live.await.unwrap().unwrap();

    assert_eq!(resumed.status, ReportStatus::Completed);
    assert_eq!(submitted.status, ReportStatus::Completed);
    assert_eq!(resumed.id, submitted.id);
    assert_eq!(h.team_usage().await, 1);
    assert_eq!(h.history_len().await, 1);
}
